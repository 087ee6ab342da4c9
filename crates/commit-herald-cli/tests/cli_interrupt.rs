#![cfg(unix)]

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

const FAREWELL: &str = "gone fishing";

/// Local origin with one base commit followed by `extra` more.
fn origin(dir: &Path, extra: usize) -> Result<Oid> {
    let repo = Repository::init(dir)?;
    let sig = Signature::now("Jane Doe", "jane@example.org")?;
    let mut parent: Option<Oid> = None;
    let mut base = None;
    for i in 0..=extra {
        fs::write(dir.join("log.txt"), format!("{}\n", i))?;
        let mut index = repo.index()?;
        index.add_path(Path::new("log.txt"))?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let parents = match parent {
            Some(id) => vec![repo.find_commit(id)?],
            None => Vec::new(),
        };
        let parents: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let id = repo.commit(Some("HEAD"), &sig, &sig, &format!("change {}", i), &tree, &parents)?;
        base.get_or_insert(id);
        parent = Some(id);
    }
    base.ok_or_else(|| anyhow::anyhow!("no commits written"))
}

fn write_config(dir: &Path, port: u16, origin: &Path, start: Oid) -> Result<std::path::PathBuf> {
    let path = dir.join("herald.json");
    let config = format!(
        r##"{{
            "irc": {{
                "url": "127.0.0.1", "port": {port}, "channel": "#dev", "nick": "herald",
                "farewell": "{FAREWELL}"
            }},
            "repos": [{{ "name": "proj", "url": "{url}", "last_seen_commit_sha": "{start}" }}],
            "announce": {{ "poll_interval_secs": 1 }}
        }}"##,
        url = origin.display(),
    );
    fs::write(&path, config)?;
    Ok(path)
}

/// Scripted server: signs the client in, reports once `trigger` matches a
/// received line, then records everything until the client hangs up.
fn serve(
    listener: TcpListener,
    trigger: fn(&str) -> bool,
    ready: mpsc::Sender<()>,
) -> thread::JoinHandle<Result<Vec<String>>> {
    thread::spawn(move || {
        let (stream, _) = listener.accept()?;
        stream.set_read_timeout(Some(Duration::from_secs(30)))?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut received = Vec::new();
        let mut notified = false;

        writer.write_all(b":srv NOTICE * :*** No Ident response\r\n")?;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim_end_matches("\r\n").to_string();
            if line.starts_with("USER ") {
                writer.write_all(b":srv 376 herald :End of /MOTD command.\r\n")?;
            } else if line.starts_with("JOIN ") {
                writer.write_all(b":srv 366 herald #dev :End of /NAMES list.\r\n")?;
            }
            if !notified && trigger(&line) {
                notified = true;
                ready.send(())?;
            }
            received.push(line);
        }
        Ok(received)
    })
}

fn interrupt(child: &Child) -> Result<()> {
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()?;
    if !status.success() {
        bail!("kill -INT failed: {}", status);
    }
    Ok(())
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> Result<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() > deadline {
            child.kill()?;
            bail!("herald still running {:?} after interrupt", limit);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn spawn_herald(config: &Path) -> Result<Child> {
    Ok(Command::new(env!("CARGO_BIN_EXE_commit-herald"))
        .arg(config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?)
}

#[test]
fn interrupt_when_idle_says_farewell_and_exits_zero() -> Result<()> {
    let work = TempDir::new()?;
    let repo_dir = work.path().join("origin");
    fs::create_dir(&repo_dir)?;
    let start = origin(&repo_dir, 0)?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let config = write_config(work.path(), listener.local_addr()?.port(), &repo_dir, start)?;
    let (ready_tx, ready_rx) = mpsc::channel();
    let server = serve(listener, |line| line.starts_with("JOIN "), ready_tx);

    let mut child = spawn_herald(&config)?;
    ready_rx.recv_timeout(Duration::from_secs(30))?;
    thread::sleep(Duration::from_millis(300));
    interrupt(&child)?;

    let status = wait_with_deadline(&mut child, Duration::from_secs(10))?;
    assert_eq!(status.code(), Some(0));
    let received = server.join().expect("server thread panicked")?;
    assert_eq!(
        received.last().map(String::as_str),
        Some(format!("QUIT :{}", FAREWELL).as_str())
    );
    Ok(())
}

/// An interrupt in the middle of a rate-limited batch stops the batch: the
/// process exits well before the remaining pauses would have elapsed.
#[test]
fn interrupt_during_large_batch_abandons_it() -> Result<()> {
    const BATCH: usize = 30;
    let work = TempDir::new()?;
    let repo_dir = work.path().join("origin");
    fs::create_dir(&repo_dir)?;
    let start = origin(&repo_dir, BATCH)?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let config = write_config(work.path(), listener.local_addr()?.port(), &repo_dir, start)?;
    let (ready_tx, ready_rx) = mpsc::channel();
    let server = serve(
        listener,
        |line| line.starts_with("PRIVMSG #dev :proj (30)"),
        ready_tx,
    );

    let mut child = spawn_herald(&config)?;
    ready_rx.recv_timeout(Duration::from_secs(30))?;
    let interrupted_at = Instant::now();
    interrupt(&child)?;

    let status = wait_with_deadline(&mut child, Duration::from_secs(10))?;
    assert_eq!(status.code(), Some(0));
    assert!(interrupted_at.elapsed() < Duration::from_secs(10));

    let received = server.join().expect("server thread panicked")?;
    let commit_lines = received
        .iter()
        .filter(|l| l.starts_with("PRIVMSG #dev :") && l.contains("change "))
        .count();
    assert!(commit_lines < BATCH, "whole batch was sent: {}", commit_lines);
    assert_eq!(
        received.last().map(String::as_str),
        Some(format!("QUIT :{}", FAREWELL).as_str())
    );
    Ok(())
}
