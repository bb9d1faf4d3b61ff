use std::io::Read;
use std::time::Duration;

use mpbar_config::WatcherConfig;

use crate::ProgressError;
use crate::channel::{UpdateSender, update_channel};
use crate::progress::{Postfix, RenderState, Renderer};
use crate::proxy::ProgressProxy;
use crate::watcher::{Watcher, WatcherState};
use crate::wire::{ChannelId, Forwarder};

/// What the bar shows when it opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub description: String,
    /// `None` draws an indeterminate bar.
    pub total: Option<u64>,
    /// Keep the finished bar on screen after close.
    pub leave: bool,
    pub postfix: Option<Postfix>,
}

impl SessionOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            total: None,
            leave: true,
            postfix: None,
        }
    }

    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn leave(mut self, leave: bool) -> Self {
        self.leave = leave;
        self
    }

    pub fn postfix(mut self, postfix: Postfix) -> Self {
        self.postfix = Some(postfix);
        self
    }
}

/// How the watcher of a session polls its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    pub channel_capacity: Option<usize>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self::from(&WatcherConfig::default())
    }
}

impl From<&WatcherConfig> for WatcherSettings {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            channel_capacity: config.channel_capacity,
        }
    }
}

impl WatcherSettings {
    fn validate(&self) -> Result<(), ProgressError> {
        if self.poll_interval.is_zero() {
            return Err(ProgressError::InvalidArgument(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == Some(0) {
            return Err(ProgressError::InvalidArgument(
                "channel capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One live progress bar.
///
/// Opening a session creates its channel and starts its watcher thread.
/// The session is closed by [`close`](Self::close), or on drop if it was
/// not closed explicitly, so the bar is finished on every exit path.
/// Sessions share nothing with each other and can be nested freely.
#[derive(Debug)]
pub struct ProgressSession {
    id: ChannelId,
    leave: bool,
    sender: UpdateSender,
    proxy: ProgressProxy,
    watcher: Option<Watcher>,
}

impl ProgressSession {
    pub fn open(options: SessionOptions, renderer: Box<dyn Renderer>) -> Result<Self, ProgressError> {
        Self::open_with(options, WatcherSettings::default(), renderer)
    }

    pub fn open_with(
        options: SessionOptions,
        settings: WatcherSettings,
        mut renderer: Box<dyn Renderer>,
    ) -> Result<Self, ProgressError> {
        settings.validate()?;

        renderer.set_description(&options.description)?;
        renderer.set_total(options.total)?;
        if let Some(postfix) = &options.postfix {
            renderer.set_postfix(postfix)?;
        }

        let id = ChannelId::next();
        let (sender, receiver) = update_channel(settings.channel_capacity);
        let state = RenderState {
            completed: 0,
            total: options.total,
            description: options.description.clone(),
            postfix: options.postfix.unwrap_or_default(),
            leave: options.leave,
        };
        let mut watcher = Watcher::new(
            format!("mpbar-watch-{}", id.get()),
            receiver,
            renderer,
            state,
            settings.poll_interval,
        );
        watcher.start()?;
        log::debug!(
            "session {id} opened: {:?} total={:?}",
            options.description,
            options.total
        );

        let description = (!options.description.is_empty()).then_some(options.description);
        Ok(Self {
            id,
            leave: options.leave,
            proxy: ProgressProxy::local(id, description, sender.clone()),
            sender,
            watcher: Some(watcher),
        })
    }

    /// Run `body` inside a session, closing it afterwards on every path.
    ///
    /// An error from `body` is returned unchanged; a failure to close is
    /// then only logged. On success a close failure is returned.
    pub fn scope<T, E, F>(
        options: SessionOptions,
        settings: WatcherSettings,
        renderer: Box<dyn Renderer>,
        body: F,
    ) -> Result<T, E>
    where
        E: From<ProgressError>,
        F: FnOnce(&ProgressSession) -> Result<T, E>,
    {
        Self::scope_with_state(options, settings, renderer, body).map(|(value, _)| value)
    }

    /// Like [`scope`](Self::scope), also returning what the bar showed when
    /// it closed.
    pub fn scope_with_state<T, E, F>(
        options: SessionOptions,
        settings: WatcherSettings,
        renderer: Box<dyn Renderer>,
        body: F,
    ) -> Result<(T, RenderState), E>
    where
        E: From<ProgressError>,
        F: FnOnce(&ProgressSession) -> Result<T, E>,
    {
        let session = Self::open_with(options, settings, renderer)?;
        let result = body(&session);
        let closed = session.close();
        match (result, closed) {
            (Ok(value), Ok(state)) => Ok((value, state)),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    log::warn!("failed to close progress session: {close_err}");
                }
                Err(e)
            }
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.watcher
            .as_ref()
            .map_or(WatcherState::Terminated, Watcher::state)
    }

    /// Advance from the owning thread or process.
    pub fn update(&self, n: i64) -> Result<(), ProgressError> {
        self.proxy.update(n)
    }

    pub fn postfix(&self, postfix: Postfix) -> Result<(), ProgressError> {
        self.proxy.postfix(postfix)
    }

    /// A proxy for worker code. Serializable for use in another process.
    pub fn new_proxy(&self) -> ProgressProxy {
        self.proxy.clone()
    }

    /// Relay wire frames read from `reader` (for example a child's stdout)
    /// into this session. Join the returned forwarder once the writer is
    /// done; the session itself does not wait for it.
    pub fn attach<R>(&self, reader: R) -> Result<Forwarder, ProgressError>
    where
        R: Read + Send + 'static,
    {
        if self.sender.is_closed() {
            return Err(ProgressError::InvalidState(format!(
                "session {} is closed",
                self.id
            )));
        }
        Forwarder::spawn(self.id, self.sender.clone(), reader)
    }

    /// Stop the watcher, apply every update sent so far, then finish the bar.
    pub fn close(mut self) -> Result<RenderState, ProgressError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<RenderState, ProgressError> {
        let watcher = self.watcher.take().ok_or_else(|| {
            ProgressError::InvalidState(format!("session {} already closed", self.id))
        })?;
        let mut outcome = watcher.stop_and_join()?;
        if let Err(e) = outcome.renderer.close(self.leave) {
            log::warn!("session {}: failed to close bar: {e}", self.id);
        }
        if outcome.render_failures > 0 {
            log::warn!(
                "session {}: {} updates could not be drawn",
                self.id,
                outcome.render_failures
            );
        }
        log::debug!(
            "session {} closed at {}/{:?}",
            self.id,
            outcome.state.completed,
            outcome.state.total
        );
        Ok(outcome.state)
    }
}

impl Drop for ProgressSession {
    fn drop(&mut self) {
        if self.watcher.is_some() {
            if let Err(e) = self.shutdown() {
                log::warn!("session {}: close on drop failed: {e}", self.id);
            }
        }
    }
}
