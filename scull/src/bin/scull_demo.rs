//! Scull CLI Demo
//!
//! Builds the device set, pushes data through a store and a pipe, and
//! prints the diagnostic dump.
//!
//! Usage: `scull-demo [config.json]` (set `RUST_LOG=debug` to watch the
//! sleep/wake traffic)

use scull::{Caller, Devices, OpenFlags, ScullConfig, StoreFile, Uid};
use std::sync::Arc;
use std::thread;

struct FileReader(std::fs::File);

impl embedded_io::ErrorType for FileReader {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(|_| embedded_io::ErrorKind::Other)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ScullConfig::from_reader(FileReader(std::fs::File::open(path)?))?,
        None => ScullConfig::default(),
    };
    let devices = Devices::new(config)?;
    let caller = Caller::new(Uid(1000));

    // Store: write a message spanning several quanta, read it back
    let message: Vec<u8> = b"scull ".iter().copied().cycle().take(10_000).collect();
    let mut file = StoreFile::open(devices.store(0)?, OpenFlags::write_only(), &caller)?;
    file.write_all(&message)?;
    let mut file = StoreFile::open(devices.store(0)?, OpenFlags::read_only(), &caller)?;
    let mut back = vec![0u8; message.len()];
    let n = file.read_all(&mut back)?;
    println!("store: wrote {} bytes, read back {n}, equal={}", message.len(), back == message);

    // Pipe: one producer thread, one consumer on this thread
    let pipe = devices.pipe(0)?;
    let mut reader = pipe.open(OpenFlags::read_only(), &caller)?;
    let producer = {
        let pipe = Arc::clone(&pipe);
        let caller = caller.clone();
        thread::spawn(move || -> scull::Result<usize> {
            let mut writer = pipe.open(OpenFlags::write_only(), &caller)?;
            let payload = vec![b'p'; 20_000];
            let mut sent = 0;
            while sent < payload.len() {
                sent += writer.write(&payload[sent..])?;
            }
            Ok(sent)
        })
    };

    let mut received = 0;
    let mut chunk = [0u8; 1024];
    while received < 20_000 {
        received += reader.read(&mut chunk)?;
    }
    let sent = producer
        .join()
        .map_err(|_| "producer thread panicked")??;
    println!("pipe: sent {sent} bytes, received {received}");

    print!("{}", devices.dump(&caller)?);
    println!("{}", serde_json::to_string_pretty(&devices.store(0)?.dump(&caller)?)?);
    Ok(())
}
