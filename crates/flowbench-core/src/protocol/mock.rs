//! Scripted in-memory channel for exercising the connection and engine
//! without hardware.
//!
//! A [`MockScript`] is the handle the test keeps: it feeds input bytes,
//! inspects written output, injects faults and records every transport
//! operation in order so tests can check the reader/writer serialization
//! invariant.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::stream::CommunicationChannel;
use super::Dialer;

/// One observed transport operation, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    /// A single byte handed to a reader
    Read(u8),
    /// A read attempt that found nothing and timed out
    TimedOut,
    /// A complete write as one chunk
    Write(Vec<u8>),
}

#[derive(Default)]
struct MockState {
    input: VecDeque<u8>,
    written: Vec<u8>,
    ops: Vec<MockOp>,
    fail_reads: bool,
    fail_writes: bool,
    dial_count: u32,
}

/// Shared scripting handle; clones refer to the same state.
#[derive(Clone, Default)]
pub struct MockScript {
    inner: Arc<Mutex<MockState>>,
}

impl MockScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full inbound line, delimiter included.
    pub fn push_line(&self, line: &str) {
        let mut st = self.inner.lock().unwrap();
        st.input.extend(line.as_bytes());
        st.input.push_back(b'\n');
    }

    /// Queue raw inbound bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().input.extend(bytes);
    }

    /// Everything written so far, as bytes.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Everything written so far, as text.
    pub fn written_string(&self) -> String {
        String::from_utf8(self.written()).unwrap()
    }

    /// The ordered transport operation log.
    pub fn ops(&self) -> Vec<MockOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Make every subsequent read fail hard.
    pub fn fail_reads(&self) {
        self.inner.lock().unwrap().fail_reads = true;
    }

    /// Make every subsequent write fail hard.
    pub fn fail_writes(&self) {
        self.inner.lock().unwrap().fail_writes = true;
    }

    /// How many channels the dialer has produced.
    pub fn dial_count(&self) -> u32 {
        self.inner.lock().unwrap().dial_count
    }

    /// A dialer handing out channels backed by this script.
    pub fn dialer(&self) -> Dialer {
        let script = self.clone();
        Box::new(move |_cfg| {
            script.inner.lock().unwrap().dial_count += 1;
            Ok(Box::new(MockChannel {
                inner: script.inner.clone(),
            }) as Box<dyn CommunicationChannel>)
        })
    }
}

/// Channel end handed to the connection under test.
pub struct MockChannel {
    inner: Arc<Mutex<MockState>>,
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut st = self.inner.lock().unwrap();
        if st.fail_reads {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted read fault",
            ));
        }
        if st.input.is_empty() {
            st.ops.push(MockOp::TimedOut);
            drop(st);
            // emulate the serial read timeout with no pending data
            thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data pending"));
        }
        let n = buf.len().min(st.input.len());
        for slot in buf.iter_mut().take(n) {
            let b = st.input.pop_front().unwrap();
            st.ops.push(MockOp::Read(b));
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut st = self.inner.lock().unwrap();
        if st.fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write fault",
            ));
        }
        st.written.extend_from_slice(buf);
        st.ops.push(MockOp::Write(buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for MockChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.inner.lock().unwrap().input.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.inner.lock().unwrap().input.clear();
        Ok(())
    }
}
