//! Fake DCC backends shared by the integration tests.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::oneshot;

/// A one-shot fake `dccifd` listening in a temporary directory.
pub struct FakeDccifd {
    pub socket_path: PathBuf,
    /// Everything the client sent before shutting down its write half.
    pub received: oneshot::Receiver<Vec<u8>>,
    _dir: tempfile::TempDir,
}

/// Start a fake `dccifd` that answers one connection with `reply`, after an
/// optional delay.
pub fn spawn_dccifd(reply: &'static str, delay: Duration) -> FakeDccifd {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("dccifd");
    let listener = UnixListener::bind(&socket_path).expect("bind fake dccifd");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut stream, _addr)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        if stream.read_to_end(&mut request).await.is_err() {
            return;
        }
        let _ = tx.send(request);
        tokio::time::sleep(delay).await;
        let _ = stream.write_all(reply.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    FakeDccifd {
        socket_path,
        received: rx,
        _dir: dir,
    }
}

/// Write an executable `/bin/sh` script named `dccproc` into `dir`.
pub fn write_dccproc(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("dccproc");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

/// A plain message with one header block and a short body.
pub fn sample_message() -> Vec<u8> {
    b"From: sender@example.net\r\nTo: rcpt@example.com\r\nSubject: offer\r\n\r\nBuy now.\r\n"
        .to_vec()
}
