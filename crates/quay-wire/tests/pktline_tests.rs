//! Framing identities over the public pkt-line surface.

use std::io::Cursor;

use quay_wire::pktline::{parse_pkt_lines, Packet, PktReader, PktWriter};

#[test]
fn encode_then_buffer_parse_is_identity() {
    let inputs: Vec<Vec<u8>> = vec![
        b"".to_vec(),
        b"a".to_vec(),
        b"want 0123\n".to_vec(),
        vec![0u8; 1000],
        vec![0xffu8; 65516],
    ];

    let mut wire = Vec::new();
    {
        let mut w = PktWriter::new(&mut wire);
        for input in &inputs {
            w.write_data(input).unwrap();
        }
        w.write_flush().unwrap();
    }

    let (frames, rest) = parse_pkt_lines(&wire).unwrap();
    assert!(rest.is_empty());
    assert_eq!(frames.len(), inputs.len() + 1);
    for (frame, input) in frames.iter().zip(&inputs) {
        assert_eq!(frame, &Packet::Data(input.clone()));
    }
    assert_eq!(frames.last(), Some(&Packet::Flush));
}

#[test]
fn stream_reader_agrees_with_buffer_parser() {
    let mut wire = Vec::new();
    {
        let mut w = PktWriter::new(&mut wire);
        w.write_text("first").unwrap();
        w.write_delim().unwrap();
        w.write_text("second").unwrap();
        w.write_response_end().unwrap();
        w.write_flush().unwrap();
    }

    let (buffered, rest) = parse_pkt_lines(&wire).unwrap();
    assert!(rest.is_empty());

    let mut reader = PktReader::new(Cursor::new(wire));
    let mut streamed = Vec::new();
    for _ in 0..buffered.len() {
        streamed.push(reader.read_packet().unwrap());
    }
    assert_eq!(buffered, streamed);
}

#[test]
fn byte_by_byte_accumulation_never_loses_frames() {
    let mut wire = Vec::new();
    {
        let mut w = PktWriter::new(&mut wire);
        for i in 0..10 {
            w.write_text(&format!("line {i}")).unwrap();
        }
        w.write_flush().unwrap();
    }

    // Feed the wire one byte at a time through the remainder contract.
    let mut carry: Vec<u8> = Vec::new();
    let mut collected = Vec::new();
    for &byte in &wire {
        carry.push(byte);
        let (frames, rest) = parse_pkt_lines(&carry).unwrap();
        let tail = rest.to_vec();
        collected.extend(frames);
        carry = tail;
    }
    assert!(carry.is_empty());
    assert_eq!(collected.len(), 11);
    assert_eq!(
        collected[0],
        Packet::Data(b"line 0\n".to_vec())
    );
    assert_eq!(collected[10], Packet::Flush);
}
