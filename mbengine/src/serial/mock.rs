use std::collections::VecDeque;
use std::io::ErrorKind;

use async_trait::async_trait;

use crate::serial::SerialLine;

/// Scripted serial line for tests
///
/// Actions queued through the [`Handle`] are consumed in order. A read with nothing
/// scripted behaves like a line timeout and returns no bytes.
pub(crate) fn mock() -> (MockLine, Handle) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let mock = MockLine {
        script: VecDeque::new(),
        pending: Vec::new(),
        rx,
        tx: event_tx,
    };
    let handle = Handle { tx, rx: event_rx };
    (mock, handle)
}

pub(crate) struct MockLine {
    script: VecDeque<Action>,
    // bytes of a scripted read not yet consumed
    pending: Vec<u8>,
    rx: tokio::sync::mpsc::UnboundedReceiver<Action>,
    tx: tokio::sync::mpsc::UnboundedSender<Event>,
}

pub(crate) struct Handle {
    tx: tokio::sync::mpsc::UnboundedSender<Action>,
    rx: tokio::sync::mpsc::UnboundedReceiver<Event>,
}

impl Handle {
    pub(crate) fn read(&mut self, data: &[u8]) {
        self.tx.send(Action::Read(data.to_vec())).unwrap()
    }

    pub(crate) fn write(&mut self, data: &[u8]) {
        self.tx.send(Action::Write(data.to_vec())).unwrap()
    }

    pub(crate) fn write_error(&mut self, kind: ErrorKind) {
        self.tx.send(Action::WriteError(kind)).unwrap()
    }

    pub(crate) fn next_event(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
enum Action {
    Read(Vec<u8>),
    Write(Vec<u8>),
    WriteError(ErrorKind),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Flush,
    Write(usize),
    Read(usize),
}

impl MockLine {
    fn sync(&mut self) {
        while let Ok(action) = self.rx.try_recv() {
            self.script.push_back(action);
        }
    }
}

#[async_trait]
impl SerialLine for MockLine {
    async fn flush(&mut self) -> std::io::Result<()> {
        self.pending.clear();
        self.tx.send(Event::Flush).unwrap();
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.sync();
        match self.script.pop_front() {
            Some(Action::Write(expected)) => {
                assert_eq!(expected.as_slice(), data);
                self.tx.send(Event::Write(data.len())).unwrap();
                Ok(())
            }
            Some(Action::WriteError(kind)) => Err(kind.into()),
            other => panic!("unexpected write: {data:?}, next action: {other:?}"),
        }
    }

    async fn read(&mut self, count: usize) -> std::io::Result<Vec<u8>> {
        self.sync();
        if self.pending.is_empty() {
            if let Some(Action::Read(_)) = self.script.front() {
                if let Some(Action::Read(data)) = self.script.pop_front() {
                    self.pending = data;
                }
            }
        }
        let taken = count.min(self.pending.len());
        let data: Vec<u8> = self.pending.drain(..taken).collect();
        self.tx.send(Event::Read(data.len())).unwrap();
        Ok(data)
    }
}
