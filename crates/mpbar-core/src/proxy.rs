use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::ProgressError;
use crate::channel::{Message, UpdateSender};
use crate::progress::Postfix;
use crate::wire::{self, ChannelId, Frame};

/// Handle given to worker code for reporting progress.
///
/// Only the channel id and the label are serialized. A proxy that crossed a
/// process boundary starts out detached and must be [`bind`](Self::bind)ed
/// to a byte sink the parent is reading from.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProgressProxy {
    channel: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip)]
    link: Link,
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone, Default)]
enum Link {
    Local(UpdateSender),
    Remote(SharedWriter),
    #[default]
    Detached,
}

impl ProgressProxy {
    pub(crate) fn local(
        channel: ChannelId,
        description: Option<String>,
        sender: UpdateSender,
    ) -> Self {
        Self {
            channel,
            description,
            link: Link::Local(sender),
        }
    }

    /// Route updates through `writer` as wire frames. Used in a child
    /// process after deserializing the proxy.
    pub fn bind<W>(self, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            link: Link::Remote(Arc::new(Mutex::new(Box::new(writer)))),
            ..self
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.link, Link::Detached)
    }

    /// Advance the bar by `n`. Zero is a no-op; negative values are
    /// rejected without touching the bar.
    pub fn update(&self, n: i64) -> Result<(), ProgressError> {
        if n < 0 {
            return Err(ProgressError::InvalidArgument(format!(
                "update amount must not be negative (got {n})"
            )));
        }
        if n == 0 {
            return Ok(());
        }
        self.send(Message::Advance(n.unsigned_abs()))
    }

    /// Replace the postfix shown after the bar.
    pub fn postfix(&self, postfix: Postfix) -> Result<(), ProgressError> {
        self.send(Message::Postfix(postfix))
    }

    /// Run `call(arg)`, then advance by one.
    pub fn run_and_update<A, R, F>(&self, call: F, arg: A) -> Result<R, ProgressError>
    where
        F: FnOnce(A) -> R,
    {
        let result = call(arg);
        self.update(1)?;
        Ok(result)
    }

    /// Run a fallible `call(arg)` and advance by one only if it succeeded.
    pub fn try_run_and_update<A, R, E, F>(&self, call: F, arg: A) -> Result<R, E>
    where
        E: From<ProgressError>,
        F: FnOnce(A) -> Result<R, E>,
    {
        let result = call(arg)?;
        self.update(1)?;
        Ok(result)
    }

    fn send(&self, message: Message) -> Result<(), ProgressError> {
        match &self.link {
            Link::Local(sender) => sender.send(message),
            Link::Remote(writer) => {
                let mut writer = writer.lock().map_err(|_| {
                    ProgressError::InvalidState("proxy writer poisoned".to_string())
                })?;
                let frame = Frame {
                    channel: self.channel,
                    message,
                };
                wire::write_frame(&mut **writer, &frame)?;
                Ok(())
            }
            Link::Detached => Err(ProgressError::InvalidState(format!(
                "proxy for channel {} is detached; bind it to a writer first",
                self.channel
            ))),
        }
    }
}

impl fmt::Debug for ProgressProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = match self.link {
            Link::Local(_) => "local",
            Link::Remote(_) => "remote",
            Link::Detached => "detached",
        };
        f.debug_struct("ProgressProxy")
            .field("channel", &self.channel)
            .field("description", &self.description)
            .field("link", &link)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::{Received, update_channel};
    use crate::wire::decode_frame;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn local_proxy() -> (ProgressProxy, crate::channel::UpdateReceiver) {
        let (tx, rx) = update_channel(None);
        (
            ProgressProxy::local(ChannelId::next(), Some("items".to_string()), tx),
            rx,
        )
    }

    #[test]
    fn update_enqueues_advance() {
        let (proxy, rx) = local_proxy();
        proxy.update(3).unwrap();
        assert_eq!(
            rx.receive(Duration::from_millis(10)),
            Received::Message(Message::Advance(3))
        );
    }

    #[test]
    fn update_zero_is_noop() {
        let (proxy, rx) = local_proxy();
        proxy.update(0).unwrap();
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn update_negative_is_invalid_argument() {
        let (proxy, rx) = local_proxy();
        let err = proxy.update(-1).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidArgument(_)));
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn run_and_update_returns_result_and_advances() {
        let (proxy, rx) = local_proxy();
        let out = proxy.run_and_update(|x: u32| x * 2, 21).unwrap();
        assert_eq!(out, 42);
        assert_eq!(
            rx.receive(Duration::from_millis(10)),
            Received::Message(Message::Advance(1))
        );
    }

    #[test]
    fn try_run_and_update_skips_update_on_error() {
        let (proxy, rx) = local_proxy();
        let failed: Result<u32, ProgressError> = proxy.try_run_and_update(
            |_: u32| Err(ProgressError::Worker("nope".to_string())),
            1,
        );
        assert!(matches!(failed, Err(ProgressError::Worker(_))));
        assert_eq!(rx.pending(), 0);

        let ok: Result<u32, ProgressError> = proxy.try_run_and_update(|x| Ok(x + 1), 1);
        assert_eq!(ok.unwrap(), 2);
        assert_eq!(rx.pending(), 1);
    }

    #[test]
    fn serialized_form_carries_only_channel_and_description() {
        let (proxy, _rx) = local_proxy();
        let json = serde_json::to_value(&proxy).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("channel"));
        assert_eq!(obj["description"], "items");
    }

    #[test]
    fn deserialized_proxy_is_detached() {
        let (proxy, _rx) = local_proxy();
        let json = serde_json::to_string(&proxy).unwrap();
        let remote: ProgressProxy = serde_json::from_str(&json).unwrap();
        assert!(remote.is_detached());
        assert_eq!(remote.channel(), proxy.channel());
        assert_eq!(remote.description(), Some("items"));
        let err = remote.update(1).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidState(_)));
    }

    #[test]
    fn bound_proxy_writes_frames() {
        let (proxy, _rx) = local_proxy();
        let json = serde_json::to_string(&proxy).unwrap();
        let buf = SharedBuf::default();
        let remote: ProgressProxy = serde_json::from_str::<ProgressProxy>(&json)
            .unwrap()
            .bind(buf.clone());

        remote.update(2).unwrap();
        remote.update(0).unwrap();
        remote.postfix(Postfix::new().with("k", "v")).unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        let first = decode_frame(&lines[0]).unwrap();
        assert_eq!(first.channel, proxy.channel());
        assert_eq!(first.message, Message::Advance(2));
        assert!(matches!(
            decode_frame(&lines[1]).unwrap().message,
            Message::Postfix(_)
        ));
    }

    #[test]
    fn debug_hides_link_internals() {
        let (proxy, _rx) = local_proxy();
        let dbg = format!("{proxy:?}");
        assert!(dbg.contains("local"));
        assert!(dbg.contains("items"));
    }
}
