//! Typed, latest-value data ports.
//!
//! An [`OutputPort`] owns a [`tokio::sync::watch`] cell holding the most
//! recently written sample.  Any number of [`InputPort`]s can be attached to
//! it through a [`PortLink`]; each input keeps its own "seen" marker so a
//! [`InputPort::read`] reports whether the sample is new *for that reader*.
//!
//! Neither side ever blocks: writing replaces the stored sample, reading
//! copies it out.  Samples are cloned across the boundary, so a reader can
//! never observe a half-written value from a writer running on another task.
//!
//! | [`FlowStatus`] | Meaning |
//! |---|---|
//! | `NoData` | unconnected, or nothing has been written yet |
//! | `OldData` | a sample exists but this reader has already seen it |
//! | `NewData` | a sample was written since this reader's last read |

use tokio::sync::watch;
use tracing::debug;

/// Outcome of a non-blocking [`InputPort::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    NoData,
    OldData,
    NewData,
}

impl FlowStatus {
    pub fn is_new(self) -> bool {
        self == FlowStatus::NewData
    }
}

/// Writing end of a data channel.
pub struct OutputPort<T> {
    name: String,
    sender: watch::Sender<Option<T>>,
}

impl<T: Clone> OutputPort<T> {
    /// Create an output port with no connected readers.
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the stored sample.  Never blocks and succeeds even when no
    /// reader is attached.
    pub fn write(&self, value: T) {
        self.sender.send_replace(Some(value));
    }

    /// `true` while at least one reader (or un-consumed [`PortLink`]) is
    /// attached.
    pub fn connected(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Create a link that an [`InputPort`] can be connected with.
    ///
    /// A sample written before the link was created counts as already seen.
    pub fn link(&self) -> PortLink<T> {
        PortLink {
            source: self.name.clone(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Copy of the most recently written sample, if any.
    pub fn last_written(&self) -> Option<T> {
        self.sender.borrow().clone()
    }
}

/// Connection token produced by [`OutputPort::link`].
///
/// Links are `Send`, so they can be moved onto another component's execution
/// context and attached there.
#[derive(Clone)]
pub struct PortLink<T> {
    source: String,
    receiver: watch::Receiver<Option<T>>,
}

impl<T> PortLink<T> {
    /// Name of the output port this link reads from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Reading end of a data channel.
pub struct InputPort<T> {
    name: String,
    receiver: Option<watch::Receiver<Option<T>>>,
}

impl<T: Clone> InputPort<T> {
    /// Create an unconnected input port.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach this input to the output behind `link`, replacing any previous
    /// connection.
    pub fn connect(&mut self, link: PortLink<T>) {
        debug!(input = %self.name, output = %link.source, "port connected");
        self.receiver = Some(link.receiver);
    }

    /// Detach from the current output.  No-op when unconnected.
    pub fn disconnect(&mut self) {
        if self.receiver.take().is_some() {
            debug!(input = %self.name, "port disconnected");
        }
    }

    pub fn connected(&self) -> bool {
        self.receiver.is_some()
    }

    /// Copy the latest sample into `out` without blocking.
    ///
    /// `out` is left untouched when the result is [`FlowStatus::NoData`].
    pub fn read(&mut self, out: &mut T) -> FlowStatus {
        let Some(receiver) = self.receiver.as_mut() else {
            return FlowStatus::NoData;
        };
        let sample = receiver.borrow_and_update();
        let fresh = sample.has_changed();
        match sample.as_ref() {
            None => FlowStatus::NoData,
            Some(value) => {
                out.clone_from(value);
                if fresh {
                    FlowStatus::NewData
                } else {
                    FlowStatus::OldData
                }
            }
        }
    }
}

/// Connect `input` to `output` in one call.
pub fn connect<T: Clone>(output: &OutputPort<T>, input: &mut InputPort<T>) {
    input.connect(output.link());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconnected_input_reads_no_data() {
        let mut input: InputPort<u32> = InputPort::new("in");
        let mut out = 7;
        assert_eq!(input.read(&mut out), FlowStatus::NoData);
        assert_eq!(out, 7, "NoData must leave the buffer untouched");
        assert!(!input.connected());
    }

    #[test]
    fn connected_input_reads_no_data_before_first_write() {
        let output: OutputPort<u32> = OutputPort::new("out");
        let mut input = InputPort::new("in");
        connect(&output, &mut input);
        let mut out = 0;
        assert_eq!(input.read(&mut out), FlowStatus::NoData);
    }

    #[test]
    fn new_then_old_data() {
        let output = OutputPort::new("out");
        let mut input = InputPort::new("in");
        connect(&output, &mut input);

        output.write(vec![1.0, 2.0]);
        let mut buf = Vec::new();
        assert_eq!(input.read(&mut buf), FlowStatus::NewData);
        assert_eq!(buf, vec![1.0, 2.0]);

        // Second read of the same sample is OldData but still delivers it.
        buf.clear();
        assert_eq!(input.read(&mut buf), FlowStatus::OldData);
        assert_eq!(buf, vec![1.0, 2.0]);
    }

    #[test]
    fn only_the_latest_sample_is_kept() {
        let output = OutputPort::new("out");
        let mut input = InputPort::new("in");
        connect(&output, &mut input);

        output.write(1);
        output.write(2);
        output.write(3);
        let mut v = 0;
        assert_eq!(input.read(&mut v), FlowStatus::NewData);
        assert_eq!(v, 3);
        assert_eq!(input.read(&mut v), FlowStatus::OldData);
    }

    #[test]
    fn every_reader_sees_new_data_once() {
        let output = OutputPort::new("out");
        let mut a = InputPort::new("a");
        let mut b = InputPort::new("b");
        connect(&output, &mut a);
        connect(&output, &mut b);

        output.write(42u8);
        let mut v = 0;
        assert_eq!(a.read(&mut v), FlowStatus::NewData);
        assert_eq!(b.read(&mut v), FlowStatus::NewData);
        assert_eq!(a.read(&mut v), FlowStatus::OldData);
    }

    #[test]
    fn sample_written_before_connection_is_old_data() {
        let output = OutputPort::new("out");
        output.write(5i32);
        let mut input = InputPort::new("in");
        connect(&output, &mut input);
        let mut v = 0;
        assert_eq!(input.read(&mut v), FlowStatus::OldData);
        assert_eq!(v, 5);
    }

    #[test]
    fn output_connected_tracks_readers() {
        let output: OutputPort<f64> = OutputPort::new("out");
        assert!(!output.connected());

        let mut input = InputPort::new("in");
        connect(&output, &mut input);
        assert!(output.connected());

        input.disconnect();
        assert!(!output.connected());
        assert!(!input.connected());
    }

    #[test]
    fn reader_gets_a_copy() {
        let output = OutputPort::new("out");
        let mut input = InputPort::new("in");
        connect(&output, &mut input);
        output.write(vec![1.0]);

        let mut buf = Vec::new();
        input.read(&mut buf);
        buf[0] = 99.0;
        assert_eq!(output.last_written(), Some(vec![1.0]));
    }

    #[test]
    fn write_without_readers_is_kept() {
        let output = OutputPort::new("out");
        output.write("hello".to_string());
        assert_eq!(output.last_written().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn link_can_cross_tasks() {
        let output = OutputPort::new("positions");
        let link = output.link();
        assert_eq!(link.source(), "positions");

        let reader = tokio::spawn(async move {
            let mut input = InputPort::new("positions_in");
            input.connect(link);
            let mut v = 0u64;
            while input.read(&mut v) != FlowStatus::NewData {
                tokio::task::yield_now().await;
            }
            v
        });

        output.write(11u64);
        assert_eq!(reader.await.unwrap(), 11);
    }
}
