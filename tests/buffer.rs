use riptide::Buffer;

use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;

#[test]
fn append_then_retrieve_round_trips() {
    let mut buf = Buffer::new();
    buf.append(b"abc");
    assert_eq!(buf.readable_bytes(), 3);
    assert_eq!(buf.peek(), b"abc");

    buf.retrieve(3);
    assert_eq!(buf.readable_bytes(), 0);
}

#[test]
fn regions_always_partition_capacity() {
    let mut buf = Buffer::with_capacity(64);

    let total =
        |b: &Buffer| b.readable_bytes() + b.writable_bytes() + b.prependable_bytes();

    assert_eq!(total(&buf), 64);
    buf.append(b"hello world");
    let cap = total(&buf);
    buf.retrieve(6);
    assert_eq!(total(&buf), cap);
    assert_eq!(buf.peek(), b"world");
    buf.append(b"!!");
    assert_eq!(buf.peek(), b"world!!");
}

#[test]
fn ensure_writable_changes_capacity_at_most_once() {
    let mut buf = Buffer::with_capacity(8);
    buf.append(b"abcdef");

    let total =
        |b: &Buffer| b.readable_bytes() + b.writable_bytes() + b.prependable_bytes();

    buf.ensure_writable(100);
    let after_first = total(&buf);
    assert!(buf.writable_bytes() >= 100);

    buf.ensure_writable(100);
    assert_eq!(total(&buf), after_first);
}

#[test]
fn compaction_is_preferred_over_growth() {
    let mut buf = Buffer::with_capacity(32);

    let total =
        |b: &Buffer| b.readable_bytes() + b.writable_bytes() + b.prependable_bytes();

    // Live data never exceeds 8 bytes, so steady-state traffic must recycle
    // the prependable region instead of growing without bound.
    for round in 0..100 {
        buf.append(&[round as u8; 8]);
        assert_eq!(buf.peek(), &[round as u8; 8]);
        buf.retrieve(8);
    }
    assert_eq!(total(&buf), 32);
}

#[test]
fn zero_length_operations_are_noops() {
    let mut buf = Buffer::new();
    buf.append(b"");
    assert_eq!(buf.readable_bytes(), 0);
    buf.append(b"xy");
    buf.retrieve(0);
    assert_eq!(buf.peek(), b"xy");
}

#[test]
fn retrieve_all_to_string_returns_content_and_clears() {
    let mut buf = Buffer::new();
    buf.append(b"one");
    buf.append(b" two");
    assert_eq!(buf.retrieve_all_to_string(), "one two");
    assert_eq!(buf.readable_bytes(), 0);
    assert_eq!(buf.prependable_bytes(), 0);
}

#[test]
#[should_panic]
fn retrieving_past_readable_end_panics() {
    let mut buf = Buffer::new();
    buf.append(b"ab");
    buf.retrieve(3);
}

#[test]
fn read_from_descriptor_fills_buffer() {
    let (mut tx, rx) = UnixStream::pair().expect("socketpair");
    tx.write_all(b"ping").expect("write");

    let mut buf = Buffer::new();
    let n = buf.read_from(rx.as_raw_fd()).expect("read_from");
    assert_eq!(n, 4);
    assert_eq!(buf.peek(), b"ping");
}

#[test]
fn oversized_read_spills_through_scratch_area() {
    let (mut tx, rx) = UnixStream::pair().expect("socketpair");

    // 10 KiB against a 1 KiB buffer: the excess arrives via the stack
    // scratch half of the vectored read and must survive intact.
    let payload: Vec<u8> = (0..10 * 1024).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();
    let writer = std::thread::spawn(move || {
        tx.write_all(&payload).expect("write payload");
    });

    let mut buf = Buffer::with_capacity(1024);
    while buf.readable_bytes() < expected.len() {
        let n = buf.read_from(rx.as_raw_fd()).expect("read_from");
        assert!(n > 0, "peer closed early");
    }
    writer.join().unwrap();

    assert_eq!(buf.peek(), &expected[..]);
}

#[test]
fn read_from_closed_peer_returns_zero() {
    let (tx, rx) = UnixStream::pair().expect("socketpair");
    drop(tx);

    let mut buf = Buffer::new();
    let n = buf.read_from(rx.as_raw_fd()).expect("read_from");
    assert_eq!(n, 0);
    assert_eq!(buf.readable_bytes(), 0);
}

#[test]
fn write_to_descriptor_advances_read_cursor() {
    use std::io::Read;

    let (tx, mut rx) = UnixStream::pair().expect("socketpair");

    let mut buf = Buffer::new();
    buf.append(b"response bytes");
    let n = buf.write_to(tx.as_raw_fd()).expect("write_to");
    assert_eq!(n, 14);
    assert_eq!(buf.readable_bytes(), 0);

    let mut got = [0u8; 14];
    rx.read_exact(&mut got).expect("read_exact");
    assert_eq!(&got, b"response bytes");
}
