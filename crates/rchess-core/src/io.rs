//! Per-instance protocol I/O channel.
//!
//! The engine is deliberately decoupled from the process's standard
//! streams: each instance is bound to its own input/output byte-stream
//! pair, so several independent instances can coexist in one process.

use std::io::{self, BufRead, BufReader, Read, Stdin, Write};

use parking_lot::Mutex;

pub struct IoChannel {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl IoChannel {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> IoChannel {
        IoChannel {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Channel bound to the process's standard streams.
    pub fn from_stdio() -> IoChannel {
        IoChannel::new(
            Box::new(BufReader::new(StdinReader(io::stdin()))),
            Box::new(io::stdout()),
        )
    }

    /// Reads one line, without the trailing newline. `None` on end of
    /// stream.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.input.lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Writes one protocol line and flushes. The output lock makes each
    /// line atomic with respect to other threads printing on the same
    /// channel.
    pub fn println(&self, line: &str) {
        let mut out = self.output.lock();
        if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
            log::warn!("io: dropped protocol line, peer closed the channel");
        }
    }

    /// `info string ...` helper.
    pub fn info_string<S: AsRef<str>>(&self, s: S) {
        self.println(&format!("info string {}", s.as_ref()));
    }
}

// io::stdin() is not BufRead by value; adapt it through its line-buffered
// lock on each read.
struct StdinReader(Stdin);

impl io::Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read(buf)
    }
}
