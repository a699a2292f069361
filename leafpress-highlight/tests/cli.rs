use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command as StdCommand, ExitStatus};
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    false
}

fn wait_for_exit(child: &mut Child) -> ExitStatus {
    let mut status = None;
    let exited = wait_for(|| {
        status = child.try_wait().unwrap();
        status.is_some()
    });
    if !exited {
        let _ = child.kill();
        panic!("server did not exit");
    }
    status.unwrap()
}

fn spawn_server(socket: &Path) -> Child {
    let child = StdCommand::new(cargo_bin("leafpress-highlight"))
        .arg(socket)
        .spawn()
        .unwrap();
    assert!(
        wait_for(|| socket.exists()),
        "server never created {}",
        socket.display()
    );
    child
}

#[test]
fn refuses_existing_socket_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let socket = dir.path().join("hl.sock");
    std::fs::write(&socket, "")?;

    Command::cargo_bin("leafpress-highlight")?
        .arg(&socket)
        .assert()
        .failure()
        .stderr(predicate::str::contains("socket already exists"));

    // Left exactly as it was.
    assert_eq!(std::fs::read_to_string(&socket)?, "");
    Ok(())
}

#[test]
fn rejects_extra_arguments_with_usage() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("leafpress-highlight")?
        .args(["a.sock", "fifo", "extra"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
    Ok(())
}

#[test]
fn help_describes_protocol() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("leafpress-highlight")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Request format"))
        .stdout(predicate::str::contains("SOCKET"));
    Ok(())
}

#[test]
fn exits_cleanly_when_socket_is_removed() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let socket = dir.path().join("hl.sock");
    let mut child = spawn_server(&socket);

    std::thread::sleep(Duration::from_millis(200));
    std::fs::remove_file(&socket)?;

    let status = wait_for_exit(&mut child);
    assert!(status.success(), "{status:?}");
    Ok(())
}

#[test]
fn terminate_signal_removes_socket_and_is_reraised() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let socket = dir.path().join("hl.sock");
    let mut child = spawn_server(&socket);

    std::thread::sleep(Duration::from_millis(200));
    // SAFETY: sending a signal to our own child process.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }

    let status = wait_for_exit(&mut child);
    assert_eq!(status.signal(), Some(libc::SIGTERM));
    assert!(!socket.exists());
    Ok(())
}

#[test]
fn signals_readiness_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let socket = dir.path().join("hl.sock");
    let ready = dir.path().join("ready");
    std::fs::write(&ready, "")?;

    let mut child = StdCommand::new(cargo_bin("leafpress-highlight"))
        .arg(&socket)
        .arg(&ready)
        .spawn()?;
    assert!(wait_for(|| socket.exists()));

    std::thread::sleep(Duration::from_millis(200));
    std::fs::remove_file(&socket)?;
    assert!(wait_for_exit(&mut child).success());
    Ok(())
}
