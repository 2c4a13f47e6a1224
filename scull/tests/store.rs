use scull::io::Fault;
use scull::store::file::{SEEK_CUR, SEEK_END, SEEK_SET};
use scull::*;
use std::io::SeekFrom;
use std::sync::Arc;

fn caller() -> Caller {
    Caller::new(Uid(1000))
}

/// Caller buffer whose every copy faults
struct Unmapped(usize);

impl UserBuf for Unmapped {
    fn len(&self) -> usize {
        self.0
    }

    fn copy_out(&self, _dst: &mut [u8]) -> std::result::Result<(), Fault> {
        Err(Fault)
    }
}

impl UserBufMut for Unmapped {
    fn len(&self) -> usize {
        self.0
    }

    fn copy_in(&mut self, _src: &[u8]) -> std::result::Result<(), Fault> {
        Err(Fault)
    }
}

// --------------------------------------------------------------------
// Read and write
//

#[test]
fn test_roundtrip_across_quanta() {
    let store = Arc::new(Store::with_geometry("s", 16, 4));
    let data: Vec<u8> = (0..200u8).collect();

    let mut file = StoreFile::open(Arc::clone(&store), OpenFlags::read_write(), &caller()).unwrap();
    file.write_all(&data).unwrap();
    assert_eq!(store.size(), 200);
    // 200 bytes at 64 bytes per node
    assert_eq!(store.node_count(), 4);

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut back = vec![0u8; 300];
    assert_eq!(file.read_all(&mut back).unwrap(), 200);
    assert_eq!(&back[..200], &data[..]);
}

#[test]
fn test_partial_read_stops_at_quantum_end() {
    let store = Store::with_geometry("s", 10, 4);
    store.write(0, b"0123456789", &caller()).unwrap();
    store.write(10, b"abcdefghij", &caller()).unwrap();

    let mut buf = [0u8; 15];
    assert_eq!(store.read(5, &mut buf, &caller()).unwrap(), 5);
    assert_eq!(&buf[..5], b"56789");
}

#[test]
fn test_overwrite_keeps_high_water_mark() {
    let store = Store::with_geometry("s", 16, 4);
    store.write(0, b"hello world", &caller()).unwrap();
    store.write(0, b"HELLO", &caller()).unwrap();
    assert_eq!(store.size(), 11);

    let mut buf = [0u8; 11];
    store.read(0, &mut buf, &caller()).unwrap();
    assert_eq!(&buf, b"HELLO world");
}

#[test]
fn test_write_only_open_truncates() {
    let store = Arc::new(Store::with_geometry("s", 16, 4));
    store.write(0, b"stale", &caller()).unwrap();

    let _file = StoreFile::open(Arc::clone(&store), OpenFlags::read_only(), &caller()).unwrap();
    assert_eq!(store.size(), 5);

    let _file = StoreFile::open(Arc::clone(&store), OpenFlags::write_only(), &caller()).unwrap();
    assert_eq!(store.size(), 0);
    assert_eq!(store.node_count(), 0);
}

#[test]
fn test_handle_mode_is_enforced() {
    let store = Arc::new(Store::with_geometry("s", 16, 4));
    let mut reader = StoreFile::open(Arc::clone(&store), OpenFlags::read_only(), &caller()).unwrap();
    assert!(matches!(
        reader.write(b"x"),
        Err(ScullError::InvalidArgument(_))
    ));

    let mut writer = StoreFile::open(store, OpenFlags::write_only(), &caller()).unwrap();
    let mut buf = [0u8; 1];
    assert!(matches!(
        writer.read(&mut buf),
        Err(ScullError::InvalidArgument(_))
    ));
}

// --------------------------------------------------------------------
// Trim
//

#[test]
fn test_trim_wipes_but_keeps_configuration() {
    let store = Store::with_geometry("s", 32, 8);
    store.write(0, b"data", &caller()).unwrap();
    store.write(1000, b"more", &caller()).unwrap();

    store.trim(&caller()).unwrap();
    assert_eq!(store.size(), 0);
    assert_eq!(store.node_count(), 0);
    assert_eq!(store.geometry(), None);
    assert_eq!((store.quantum(), store.qset()), (32, 8));

    let mut buf = [0u8; 4];
    assert_eq!(store.read(0, &mut buf, &caller()).unwrap(), 0);

    // Idempotent
    store.trim(&caller()).unwrap();
    assert_eq!(store.size(), 0);
}

// --------------------------------------------------------------------
// Addressing
//

#[test]
fn test_addressing_law() {
    let store = Store::with_geometry("s", 4000, 500);
    // node span 2_000_000; 5_000_123 is node 2, slot 250, byte 123
    store.write(5_000_123, b"Z", &caller()).unwrap();

    assert_eq!(store.node_count(), 3);
    let quantum = store.peek(2, 250).unwrap();
    assert_eq!(quantum.len(), 4000);
    assert_eq!(quantum[123], b'Z');
    assert!(store.peek(2, 249).is_none());
    assert!(store.peek(0, 0).is_none());

    let geometry = store.geometry().unwrap();
    let pos = geometry.locate(5_000_123).unwrap();
    assert_eq!((pos.node, pos.slot, pos.byte), (2, 250, 123));
}

#[test]
fn test_five_megabytes_spans_three_nodes() {
    let store = Arc::new(Store::with_geometry("s", 4000, 500));
    let data: Vec<u8> = (0..5_000_000u32).map(|i| (i % 251) as u8).collect();

    let mut file = StoreFile::open(Arc::clone(&store), OpenFlags::write_only(), &caller()).unwrap();
    file.write_all(&data).unwrap();
    assert_eq!(store.size(), 5_000_000);
    assert_eq!(store.node_count(), 3);

    let dump = store.dump(&caller()).unwrap();
    assert_eq!(dump.quanta(), 1250);

    let mut file = StoreFile::open(store, OpenFlags::read_only(), &caller()).unwrap();
    let mut back = vec![0u8; 5_000_000];
    assert_eq!(file.read_all(&mut back).unwrap(), 5_000_000);
    assert!(back == data);
}

#[test]
fn test_hole_reads_as_end_of_data() {
    let store = Store::with_geometry("s", 8, 2);
    store.write(40, b"tail", &caller()).unwrap();
    assert_eq!(store.size(), 44);

    let mut buf = [0u8; 8];
    assert_eq!(store.read(0, &mut buf, &caller()).unwrap(), 0);
    assert_eq!(store.read(18, &mut buf, &caller()).unwrap(), 0);
    assert_eq!(store.read(40, &mut buf, &caller()).unwrap(), 4);
}

// --------------------------------------------------------------------
// Geometry freezing
//

#[test]
fn test_geometry_frozen_until_trim() {
    let store = Store::with_geometry("s", 4, 2);
    let root = Caller::root();
    store.write(0, b"abcd", &caller()).unwrap();
    store.write(4, b"ef", &caller()).unwrap();

    let mut arg = 16;
    store.control(Command::SetQuantum, &mut arg, &root).unwrap();
    assert_eq!(store.quantum(), 16);

    // The live chain keeps its geometry
    assert_eq!(store.write(6, b"ghij", &caller()).unwrap(), 2);
    assert_eq!(store.geometry().unwrap().quantum, 4);
    let mut buf = [0u8; 8];
    assert_eq!(store.read(0, &mut buf, &caller()).unwrap(), 4);
    assert_eq!(&buf[..4], b"abcd");

    store.trim(&caller()).unwrap();
    assert_eq!(store.write(0, b"0123456789", &caller()).unwrap(), 10);
    assert_eq!(store.geometry().unwrap().quantum, 16);
}

// --------------------------------------------------------------------
// Faults
//

#[test]
fn test_faulting_write_leaves_size_unchanged() {
    let store = Store::with_geometry("s", 16, 4);
    store.write(0, b"abc", &caller()).unwrap();
    assert_eq!(
        store.write(3, &Unmapped(8), &caller()),
        Err(ScullError::BadAddress)
    );
    assert_eq!(store.size(), 3);
}

#[test]
fn test_faulting_read_reports_bad_address() {
    let store = Store::with_geometry("s", 16, 4);
    store.write(0, b"abc", &caller()).unwrap();
    assert_eq!(
        store.read(0, &mut Unmapped(3), &caller()),
        Err(ScullError::BadAddress)
    );
}

#[test]
fn test_pending_interrupt_on_uncontended_lock_proceeds() {
    let store = Store::with_geometry("s", 16, 4);
    let caller = caller();
    caller.interrupt.raise();
    assert_eq!(store.write(0, b"ok", &caller).unwrap(), 2);
}

// --------------------------------------------------------------------
// Seek
//

#[test]
fn test_seek_origins() {
    let store = Arc::new(Store::with_geometry("s", 16, 4));
    store.write(0, b"0123456789", &caller()).unwrap();
    let mut file = StoreFile::open(store, OpenFlags::read_only(), &caller()).unwrap();

    assert_eq!(file.llseek(4, SEEK_SET).unwrap(), 4);
    assert_eq!(file.llseek(2, SEEK_CUR).unwrap(), 6);
    assert_eq!(file.llseek(-3, SEEK_END).unwrap(), 7);

    let mut buf = [0u8; 3];
    assert_eq!(file.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"789");
    assert_eq!(file.position(), 10);

    // Past the end is allowed
    assert_eq!(file.seek(SeekFrom::End(100)).unwrap(), 110);
    assert_eq!(file.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_seek_rejects_negative_and_bad_whence() {
    let store = Arc::new(Store::with_geometry("s", 16, 4));
    let mut file = StoreFile::open(store, OpenFlags::read_only(), &caller()).unwrap();

    assert!(matches!(
        file.seek(SeekFrom::Current(-1)),
        Err(ScullError::InvalidArgument(_))
    ));
    assert!(matches!(
        file.llseek(0, 7),
        Err(ScullError::InvalidArgument(_))
    ));
    assert_eq!(file.position(), 0);
}

#[test]
fn test_std_io_traits() {
    use std::io::{Read, Seek, Write};

    let store = Arc::new(Store::with_geometry("s", 8, 4));
    let mut file = StoreFile::open(store, OpenFlags::read_write(), &caller()).unwrap();
    Write::write_all(&mut file, b"through std::io").unwrap();
    Seek::rewind(&mut file).unwrap();

    let mut text = String::new();
    Read::read_to_string(&mut file, &mut text).unwrap();
    assert_eq!(text, "through std::io");
}

// --------------------------------------------------------------------
// Dump
//

#[test]
fn test_dump_reports_occupancy() {
    let store = Store::with_geometry("scull0", 8, 4);
    store.write(0, b"x", &caller()).unwrap();
    store.write(70, b"y", &caller()).unwrap();

    let dump = store.dump(&caller()).unwrap();
    assert_eq!(dump.size, 71);
    assert_eq!(dump.nodes.len(), 3);
    assert!(dump.nodes[1].slots.is_none());
    assert_eq!(dump.quanta(), 2);

    let text = dump.to_string();
    assert!(text.starts_with("Device scull0: qset 4, q 8, sz 71"));
    assert!(text.contains("item 1: no data"));

    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json["size"], 71);
}
