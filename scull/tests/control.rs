use scull::*;
use std::sync::Arc;

fn user() -> Caller {
    Caller::new(Uid(1000))
}

#[test]
fn test_set_needs_privilege() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let mut arg = 64;
    assert_eq!(
        store.control(Command::SetQuantum, &mut arg, &user()),
        Err(ScullError::PermissionDenied)
    );
    assert_eq!(
        store.control(Command::TellQset, &mut arg, &user()),
        Err(ScullError::PermissionDenied)
    );
    assert_eq!(store.quantum(), 4000);
    assert_eq!(store.qset(), 1000);
}

#[test]
fn test_get_and_query() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let mut arg = 0;
    assert_eq!(store.control(Command::GetQuantum, &mut arg, &user()), Ok(0));
    assert_eq!(arg, 4000);
    assert_eq!(store.control(Command::QueryQset, &mut arg, &user()), Ok(1000));
}

#[test]
fn test_tell_and_set() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let root = Caller::root();

    let mut arg = 512;
    store.control(Command::SetQuantum, &mut arg, &root).unwrap();
    let mut arg = 20;
    store.control(Command::TellQset, &mut arg, &root).unwrap();
    assert_eq!((store.quantum(), store.qset()), (512, 20));
}

#[test]
fn test_exchange_and_shift_return_old_value() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let root = Caller::root();

    let mut arg = 100;
    assert_eq!(store.control(Command::ExchangeQuantum, &mut arg, &root), Ok(0));
    assert_eq!(arg, 4000);
    assert_eq!(store.quantum(), 100);

    let mut arg = 7;
    assert_eq!(store.control(Command::ShiftQset, &mut arg, &root), Ok(1000));
    assert_eq!(store.qset(), 7);
}

#[test]
fn test_reset_zeroes_geometry_and_blocks_growth() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let mut arg = 0;
    store.control(Command::Reset, &mut arg, &user()).unwrap();
    assert_eq!((store.quantum(), store.qset()), (0, 0));
    assert!(matches!(
        store.write(0, b"x", &user()),
        Err(ScullError::InvalidArgument(_))
    ));
}

#[test]
fn test_negative_size_rejected() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let mut arg = -5;
    assert!(matches!(
        store.control(Command::TellQuantum, &mut arg, &Caller::root()),
        Err(ScullError::InvalidArgument(_))
    ));
}

#[test]
fn test_decoded_codes_drive_store() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let code = Command::QueryQuantum.code();
    assert_eq!(code, (u32::from(b'k') << 8) | 7);
    let cmd = Command::decode(code).unwrap();
    let mut arg = 0;
    assert_eq!(store.control(cmd, &mut arg, &user()), Ok(4000));

    assert_eq!(Command::decode(0xdead), Err(ScullError::UnknownCommand(0xdead)));
}

#[test]
fn test_pipe_size_commands() {
    let pipe = Arc::new(Pipe::with_buffer_size("scullpipe0", 4000));
    assert_eq!(pipe.control(Command::QueryPipeSize, 0, &user()), Ok(4000));
    assert_eq!(
        pipe.control(Command::TellPipeSize, 64, &user()),
        Err(ScullError::PermissionDenied)
    );
    assert!(matches!(
        pipe.control(Command::TellPipeSize, 1, &Caller::root()),
        Err(ScullError::InvalidArgument(_))
    ));

    pipe.control(Command::TellPipeSize, 64, &Caller::root()).unwrap();
    let _file = pipe.open(OpenFlags::read_only(), &user()).unwrap();
    assert_eq!(pipe.status().capacity, 64);
}

#[test]
fn test_commands_on_wrong_device() {
    let store = Store::with_geometry("scull0", 4000, 1000);
    let pipe = Pipe::with_buffer_size("scullpipe0", 4000);
    let mut arg = 0;

    assert!(matches!(
        store.control(Command::QueryPipeSize, &mut arg, &user()),
        Err(ScullError::UnknownCommand(_))
    ));
    assert!(matches!(
        pipe.control(Command::QueryQuantum, 0, &user()),
        Err(ScullError::UnknownCommand(_))
    ));
}
