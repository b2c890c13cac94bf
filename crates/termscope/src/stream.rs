//! Stream engine
//!
//! Consumes the raw byte stream the pump delivers and runs expectations
//! against it one byte at a time. Bytes handed out by a successful
//! expectation are gone for good; bytes read by a failed one go back to the
//! front of the queue.
//!
//! Matching runs on the text with escape sequences removed. Plain control
//! bytes such as `\r` stay in, so patterns see line endings as the program
//! wrote them.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use terminal::AnsiStripper;

use crate::cancel::Cancellation;
use crate::error::Error;
use crate::matcher::{describe_all, first_hit, Matcher, Observation};

/// Longest single wait on the queue, so cancellation is noticed promptly
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What the pump sends
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Data(Vec<u8>),
    Closed,
}

pub(crate) struct Stream {
    events: Receiver<StreamEvent>,

    /// Received but not yet consumed
    pending: VecDeque<u8>,

    /// No more events will arrive
    ended: bool,

    debug: bool,
}

impl Stream {
    pub(crate) fn new(events: Receiver<StreamEvent>, debug: bool) -> Self {
        Self {
            events,
            pending: VecDeque::new(),
            ended: false,
            debug,
        }
    }

    /// Bytes received but not yet consumed by any expectation
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Read until one of `matchers` hits, `timeout` passes, `cancel` fires
    /// or the stream ends
    ///
    /// Returns everything read during this call, up to and including the
    /// byte that produced the hit. The stripped text is built once per call,
    /// one byte at a time, and the deadline is checked before every byte so
    /// a large backlog cannot outlast it.
    pub(crate) fn expect(
        &mut self,
        matchers: &[Matcher],
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<String, Error> {
        let started = Instant::now();
        let deadline = cancel.child(timeout);
        let inspects_text = matchers.iter().any(Matcher::inspects_text);
        let mut consumed: Vec<u8> = Vec::new();
        let mut stripper = AnsiStripper::new();

        loop {
            if inspects_text {
                while let Some(&byte) = self.pending.front() {
                    if deadline.is_cancelled() {
                        break;
                    }
                    self.pending.pop_front();
                    consumed.push(byte);

                    // Escape sequences and partial characters add no text
                    if !stripper.push(byte) {
                        continue;
                    }
                    let hit = first_hit(matchers, &Observation::Grown(stripper.text()));
                    if self.debug {
                        tracing::debug!(byte = ?char::from(byte), buffered = consumed.len(), hit = ?hit, "evaluated byte");
                    }
                    if hit.is_some() {
                        return Ok(self.finish(consumed, "matched"));
                    }
                }
            } else {
                consumed.extend(self.pending.drain(..));
            }

            if self.ended && self.pending.is_empty() {
                if first_hit(matchers, &Observation::EndOfStream).is_some() {
                    return Ok(self.finish(consumed, "end of stream"));
                }
                self.restore(consumed);
                return Err(Error::EndOfStream {
                    criteria: describe_all(matchers),
                });
            }

            if deadline.is_cancelled() {
                if first_hit(matchers, &Observation::Timeout).is_some() {
                    return Ok(self.finish(consumed, "deadline"));
                }
                self.restore(consumed);
                return Err(Error::Timeout {
                    waited: started.elapsed(),
                    criteria: describe_all(matchers),
                });
            }

            let wait = deadline
                .remaining()
                .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));
            match self.events.recv_timeout(wait) {
                Ok(StreamEvent::Data(bytes)) => self.pending.extend(bytes),
                Ok(StreamEvent::Closed) | Err(RecvTimeoutError::Disconnected) => self.ended = true,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn finish(&self, consumed: Vec<u8>, reason: &str) -> String {
        if self.debug {
            tracing::debug!(consumed = consumed.len(), pending = self.pending.len(), reason, "expectation satisfied");
        }
        String::from_utf8_lossy(&consumed).into_owned()
    }

    /// Put bytes from a failed expectation back in front of the queue
    fn restore(&mut self, consumed: Vec<u8>) {
        for byte in consumed.into_iter().rev() {
            self.pending.push_front(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Sender};

    const SHORT: Duration = Duration::from_millis(30);

    fn stream() -> (Sender<StreamEvent>, Stream) {
        let (tx, rx) = mpsc::channel();
        (tx, Stream::new(rx, false))
    }

    fn send(tx: &Sender<StreamEvent>, text: &str) {
        tx.send(StreamEvent::Data(text.as_bytes().to_vec())).unwrap();
    }

    #[test]
    fn match_consumes_through_the_hit() {
        let (tx, mut stream) = stream();
        send(&tx, "Hello, World!");

        let got = stream
            .expect(&[Matcher::literal("Hello")], SHORT, &Cancellation::new())
            .unwrap();
        assert_eq!(got, "Hello");
        assert_eq!(stream.pending_len(), ", World!".len());

        let got = stream
            .expect(&[Matcher::literal("World")], SHORT, &Cancellation::new())
            .unwrap();
        assert_eq!(got, ", World");
    }

    #[test]
    fn consumed_bytes_never_match_again() {
        let (tx, mut stream) = stream();
        send(&tx, "HiHi");

        stream.expect(&[Matcher::literal("HiHi")], SHORT, &Cancellation::new()).unwrap();
        let err = stream
            .expect(&[Matcher::literal("Hi")], SHORT, &Cancellation::new())
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
    }

    #[test]
    fn timeout_keeps_buffered_bytes() {
        let (tx, mut stream) = stream();
        send(&tx, "abc");

        let err = stream
            .expect(&[Matcher::literal("xyz")], SHORT, &Cancellation::new())
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(stream.pending_len(), 3);

        let got = stream
            .expect(&[Matcher::literal("abc")], SHORT, &Cancellation::new())
            .unwrap();
        assert_eq!(got, "abc");
    }

    #[test]
    fn bytes_split_across_chunks_still_match() {
        let (tx, mut stream) = stream();
        send(&tx, "Wor");
        send(&tx, "ld");

        let got = stream
            .expect(&[Matcher::literal("World")], SHORT, &Cancellation::new())
            .unwrap();
        assert_eq!(got, "World");
    }

    #[test]
    fn ansi_is_stripped_before_matching() {
        let (tx, mut stream) = stream();
        send(&tx, "\x1b[38;5;140mfoo\x1b[0m bar");

        let got = stream
            .expect(&[Matcher::literal("foo bar")], SHORT, &Cancellation::new())
            .unwrap();
        assert!(got.ends_with(" bar"));
        assert!(got.starts_with("\x1b[38;5;140m"), "raw bytes are returned");
    }

    #[test]
    fn carriage_returns_are_matchable() {
        let (tx, mut stream) = stream();
        send(&tx, "line one\r\nline two\r\n");

        let matchers = [Matcher::pattern(r"line one\r\nline two").unwrap()];
        let got = stream.expect(&matchers, SHORT, &Cancellation::new()).unwrap();
        assert_eq!(got, "line one\r\nline two");
    }

    #[test]
    fn backlog_cannot_outlast_the_deadline() {
        let (tx, mut stream) = stream();
        let backlog = "a".repeat(64 * 1024);
        send(&tx, &backlog);

        let started = Instant::now();
        let err = stream
            .expect(&[Matcher::literal("never")], SHORT, &Cancellation::new())
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert_eq!(stream.pending_len(), backlog.len());
    }

    #[test]
    fn prompt_after_long_output_is_found_in_time() {
        let (tx, mut stream) = stream();
        let output = format!("{}\r\nPROMPT> ", "y".repeat(8000));
        send(&tx, &output);

        let got = stream
            .expect(&[Matcher::literal("PROMPT>")], Duration::from_millis(250), &Cancellation::new())
            .unwrap();
        assert!(got.ends_with("PROMPT>"));
        assert_eq!(stream.pending_len(), 1);
    }

    #[test]
    fn first_matcher_to_hit_wins() {
        let (tx, mut stream) = stream();
        send(&tx, "one two three");

        let matchers = [Matcher::literal("three"), Matcher::literal("two")];
        let got = stream.expect(&matchers, SHORT, &Cancellation::new()).unwrap();
        assert_eq!(got, "one two");
    }

    #[test]
    fn flush_drains_everything_on_deadline() {
        let (tx, mut stream) = stream();
        send(&tx, "payload");

        let got = stream
            .expect(&[Matcher::flush()], SHORT, &Cancellation::new())
            .unwrap();
        assert_eq!(got, "payload");
        assert_eq!(stream.pending_len(), 0);
    }

    #[test]
    fn end_of_stream_matches_eof_and_fails_others() {
        let (tx, mut stream) = stream();
        send(&tx, "tail");
        tx.send(StreamEvent::Closed).unwrap();

        let err = stream
            .expect(&[Matcher::literal("missing")], SHORT, &Cancellation::new())
            .unwrap_err();
        assert!(err.is_end_of_stream(), "got {err:?}");
        assert_eq!(stream.pending_len(), 4);

        let got = stream.expect(&[Matcher::Eof], SHORT, &Cancellation::new()).unwrap();
        assert_eq!(got, "tail");
    }

    #[test]
    fn dropped_sender_counts_as_end_of_stream() {
        let (tx, mut stream) = stream();
        drop(tx);

        let got = stream.expect(&[Matcher::flush()], SHORT, &Cancellation::new()).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn cancelled_parent_ends_wait_early() {
        let (_tx, mut stream) = stream();
        let parent = Cancellation::new();
        parent.cancel();

        let started = Instant::now();
        let err = stream
            .expect(&[Matcher::literal("x")], Duration::from_secs(10), &parent)
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn late_bytes_are_picked_up() {
        let (tx, mut stream) = stream();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            send(&tx, "late");
            tx
        });

        let got = stream
            .expect(&[Matcher::literal("late")], Duration::from_secs(2), &Cancellation::new())
            .unwrap();
        assert_eq!(got, "late");
        drop(writer.join().unwrap());
    }

    proptest::proptest! {
        /// However the bytes are chunked, a literal expectation consumes
        /// exactly through its first occurrence
        #[test]
        fn chunking_does_not_change_the_hit(
            text in "[a-z ]{1,80}",
            needle in "[a-z]{1,3}",
            cuts in proptest::collection::vec(0usize..80, 0..6),
        ) {
            let (tx, mut stream) = stream();
            let mut start = 0;
            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(text.len())).collect();
            cuts.sort_unstable();
            for cut in cuts.into_iter().chain([text.len()]) {
                send(&tx, &text[start..cut]);
                start = cut;
            }
            tx.send(StreamEvent::Closed).unwrap();

            let result = stream.expect(&[Matcher::literal(needle.clone())], Duration::from_secs(1), &Cancellation::new());
            match text.find(&needle) {
                Some(at) => {
                    let end = at + needle.len();
                    proptest::prop_assert_eq!(result.unwrap(), &text[..end]);
                    proptest::prop_assert_eq!(stream.pending_len(), text.len() - end);
                }
                None => {
                    proptest::prop_assert!(result.unwrap_err().is_end_of_stream());
                    proptest::prop_assert_eq!(stream.pending_len(), text.len());
                }
            }
        }
    }
}
