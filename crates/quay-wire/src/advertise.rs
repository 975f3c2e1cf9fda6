//! Ref advertisement: the server's opening statement for both services.

use std::io::Write;

use quay_hash::Oid;
use quay_object::ObjectType;
use quay_ref::Reference;
use quay_repo::Repository;

use crate::capability;
use crate::pktline::PktWriter;
use crate::session::Service;
use crate::WireError;

/// One advertised line: a name (possibly a `^{}` peel companion) and
/// the id it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedRef {
    pub name: String,
    pub target: Oid,
}

/// Collect the advertisement in wire order: HEAD first when resolvable,
/// then `refs/` sorted by name, each annotated tag followed by its
/// `^{}` peel line.
pub fn advertised_refs(repo: &Repository) -> Result<Vec<AdvertisedRef>, WireError> {
    let mut lines = Vec::new();

    let head = quay_ref::RefName::new("HEAD")?;
    if let Some(target) = repo.refs().resolve(&head)? {
        lines.push(AdvertisedRef {
            name: "HEAD".into(),
            target,
        });
    }

    for reference in repo.refs().list(Some("refs/"))? {
        let Reference::Direct { name, target } = &reference else {
            continue;
        };
        lines.push(AdvertisedRef {
            name: name.as_str().to_string(),
            target: *target,
        });

        if name.is_tag() {
            if let Some(peeled) = peel_to_non_tag(repo, target)? {
                if peeled != *target {
                    lines.push(AdvertisedRef {
                        name: format!("{name}^{{}}"),
                        target: peeled,
                    });
                }
            }
        }
    }

    Ok(lines)
}

/// Follow annotated tags until something that is not a tag.
fn peel_to_non_tag(repo: &Repository, start: &Oid) -> Result<Option<Oid>, WireError> {
    let mut current = *start;
    for _ in 0..32 {
        match repo.objects().get(&current)? {
            Some(raw) if raw.kind == ObjectType::Tag => {
                let tag = repo.objects().read_tag(&current)?;
                current = tag.target;
            }
            Some(_) => return Ok(Some(current)),
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Write the advertisement for `service`, capability suffix on the
/// first line, flush at the end. An empty repository advertises the
/// zero id under the reserved `capabilities^{}` name.
pub fn write_advertisement<W: Write>(
    repo: &Repository,
    service: Service,
    out: &mut PktWriter<W>,
) -> Result<(), WireError> {
    let symref = repo.head_target()?;
    let caps = capability::advertised(service, symref.as_ref().map(|r| r.as_str()));

    let lines = advertised_refs(repo)?;
    if lines.is_empty() {
        let zero = "0".repeat(repo.hash_kind().hex_len());
        out.write_text(&format!("{zero} capabilities^{{}}\0{caps}"))?;
    } else {
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                out.write_text(&format!("{} {}\0{}", line.target.to_hex(), line.name, caps))?;
            } else {
                out.write_text(&format!("{} {}", line.target.to_hex(), line.name))?;
            }
        }
    }
    out.write_flush()?;
    out.flush()?;
    Ok(())
}
