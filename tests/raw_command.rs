use ftp_manager::*;
use ftp_test_common::TestServer;

use std::fs;
use std::os::unix::fs::PermissionsExt;

use pretty_assertions::assert_eq;

mod common;
use common::*;

fn channel() -> RawCommandChannel {
    RawCommandChannel::new().unwrap()
}

#[test]
fn test_delete_file() {
    let server = TestServer::builder().start();
    fs::write(server.root().join("a.txt"), b"a").unwrap();

    channel()
        .delete_file_named("a.txt", &descriptor(&server))
        .unwrap();

    assert!(!server.root().join("a.txt").exists());
    assert_eq!(
        server.commands(),
        ["USER user", "PASS ****", "DELE /a.txt", "QUIT"]
    );
}

#[test]
fn test_delete_directory() {
    let server = TestServer::builder().start();
    fs::create_dir(server.root().join("dir")).unwrap();

    channel()
        .delete_file_named("dir", &descriptor(&server))
        .unwrap();

    assert!(!server.root().join("dir").exists());
    assert_eq!(
        server.commands(),
        ["USER user", "PASS ****", "DELE /dir", "RMD /dir", "QUIT"]
    );
}

#[test]
fn test_delete_path() {
    let server = TestServer::builder().start();
    fs::create_dir_all(server.root().join("a").join("b")).unwrap();
    fs::write(server.root().join("a").join("file.txt"), b"x").unwrap();

    // The descriptor's remote path does not matter.
    let descriptor = descriptor_at(&server, "/elsewhere");
    let channel = channel();

    channel.delete_path("/a/b/", &descriptor).unwrap();
    channel.delete_path("/a/file.txt", &descriptor).unwrap();

    assert!(!server.root().join("a").join("b").exists());
    assert!(!server.root().join("a").join("file.txt").exists());

    let commands = server.commands();
    assert!(commands.contains(&"RMD /a/b".to_owned()), "{commands:#?}");
    assert!(!commands.contains(&"DELE /a/b".to_owned()), "{commands:#?}");
    assert!(commands.contains(&"DELE /a/file.txt".to_owned()), "{commands:#?}");
}

#[test]
fn test_delete_missing_file() {
    let server = TestServer::builder().start();

    let err = channel()
        .delete_file_named("missing.txt", &descriptor(&server))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommandError, "{err:#?}");
    assert!(err.reply().is_some());

    // The server answers like vsftpd, so `RMD` is tried as well, but the
    // error is about the file.
    assert!(
        matches!(&err, Error::CommandError { command, code: 550, .. } if command == "DELE /missing.txt"),
        "{err:#?}"
    );
    assert_eq!(
        server.commands(),
        ["USER user", "PASS ****", "DELE /missing.txt", "RMD /missing.txt", "QUIT"]
    );
}

#[test]
fn test_delete_path_missing_file() {
    let server = TestServer::builder().start();

    let err = channel()
        .delete_path("/nested/missing.bin", &descriptor(&server))
        .unwrap_err();

    assert!(
        matches!(&err, Error::CommandError { command, .. } if command.starts_with("DELE ")),
        "{err:#?}"
    );
}

#[test]
fn test_chmod() {
    let server = TestServer::builder().start();
    let path = server.root().join("script.sh");
    fs::write(&path, b"#!/bin/sh\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

    let descriptor = descriptor(&server);

    channel()
        .chmod_file_named("script.sh", 0o755, &descriptor)
        .unwrap();

    assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o755);
    assert!(server
        .commands()
        .contains(&"SITE CHMOD 755 /script.sh".to_owned()));

    let entries = TransferEngine::new()
        .unwrap()
        .contents_of_server(&descriptor)
        .unwrap();
    assert_eq!(entries[0].name(), "script.sh");
    assert_eq!(entries[0].mode(), Some(0o755));
}

#[test]
fn test_chmod_unsupported() {
    let server = TestServer::builder().unix(false).start();
    fs::write(server.root().join("a.txt"), b"a").unwrap();

    let err = channel()
        .chmod_file_named("a.txt", 0o644, &descriptor(&server))
        .unwrap_err();

    assert!(matches!(err, Error::CommandError { code: 500, .. }), "{err:#?}");
}

#[test]
fn test_chmod_invalid_mode() {
    let server = TestServer::builder().start();

    let err = channel()
        .chmod_file_named("a.txt", 0o17777, &descriptor(&server))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GeneralError, "{err:#?}");
    assert!(server.commands().is_empty());
}

#[test]
fn test_login_rejected() {
    let server = TestServer::builder().start();
    let descriptor = ServerDescriptor::new(&server.host(), "user", "wrong").unwrap();

    let err = channel()
        .delete_file_named("a.txt", &descriptor)
        .unwrap_err();

    assert!(matches!(err, Error::AuthError { code: 530, .. }), "{err:#?}");
}

#[test]
fn test_connection_refused() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let descriptor = ServerDescriptor::anonymous(&addr.to_string()).unwrap();

    let err = channel()
        .delete_file_named("a.txt", &descriptor)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionError, "{err:#?}");
}
