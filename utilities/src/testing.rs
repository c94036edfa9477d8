//! In-memory link for exercising device handlers without hardware.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::transport::Transport;

const EOS: u8 = b'\r';

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Vec<u8>>>,
    pending: VecDeque<u8>,
    partial: Vec<u8>,
    written: Vec<String>,
    broken: bool,
}

/// Carriage-return framed fake device.
///
/// Each complete command written is recorded; if a reply was queued for that
/// exact command text it becomes readable. Reading with nothing queued times
/// out, like a silent device. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedLink {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `reply` (without terminator) for the next `command`.
    pub fn respond(&self, command: &str, reply: &str) -> &Self {
        let mut frame = reply.as_bytes().to_vec();
        frame.push(EOS);
        self.respond_raw(command, frame)
    }

    pub fn respond_raw(&self, command: &str, frame: impl Into<Vec<u8>>) -> &Self {
        self.script()
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(frame.into());
        self
    }

    /// Makes `bytes` readable right away, as if a reply the caller already
    /// gave up on had just arrived.
    pub fn deliver_late(&self, bytes: &[u8]) {
        self.script().pending.extend(bytes);
    }

    /// Makes every following write fail with a broken pipe.
    pub fn break_link(&self) {
        self.script().broken = true;
    }

    pub fn written(&self) -> Vec<String> {
        self.script().written.clone()
    }

    pub fn clear_written(&self) {
        self.script().written.clear();
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut script = self.script();
        if script.pending.is_empty() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }

        let mut n = 0;
        while n < buf.len() {
            match script.pending.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Transport for ScriptedLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.script().pending.clear();
        Ok(())
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut script = self.script();
        if script.broken {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }

        for &byte in buf {
            if byte != EOS {
                script.partial.push(byte);
                continue;
            }

            let command = String::from_utf8_lossy(&script.partial).into_owned();
            script.partial.clear();

            let reply = script
                .replies
                .get_mut(&command)
                .and_then(|queue| queue.pop_front());
            if let Some(reply) = reply {
                script.pending.extend(reply);
            }
            script.written.push(command);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
