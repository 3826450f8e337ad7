//! In-memory modem that answers AT commands from a script.
//!
//! Every channel opened by a [`LoopbackFactory`] shares one [`LoopbackScript`],
//! which holds the canned replies and records each command line sent, so the
//! traffic stays observable after the channel has been handed to the pool.

use crate::channel::{AtChannel, ChannelConfig, ChannelFactory, LinkId};
use crate::error::{DeviceError, DeviceResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Canned answer to one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    lines: Vec<String>,
    error: Option<DeviceError>,
}

impl Reply {
    /// Final result `OK` with no information lines.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Information lines followed by `OK`.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn line(line: &str) -> Self {
        Self::lines([line])
    }

    /// Final result `ERROR`, reported as `error`.
    pub fn error(error: DeviceError) -> Self {
        Self {
            lines: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub link: LinkId,
    pub line: String,
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: HashMap<String, VecDeque<Reply>>,
    transcript: Vec<TranscriptEntry>,
    settings: HashMap<LinkId, ChannelConfig>,
    unavailable: Vec<LinkId>,
    opened: usize,
    closed: usize,
}

impl ScriptState {
    // The last queued reply sticks once the others are used up.
    fn next_reply(&mut self, command: &str) -> Reply {
        match self.replies.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => Reply::ok(),
        }
    }
}

/// Shared replies and traffic record of the loopback modem.
#[derive(Debug, Clone, Default)]
pub struct LoopbackScript {
    state: Arc<Mutex<ScriptState>>,
}

impl LoopbackScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A script answering the usual identification and SIM queries.
    pub fn with_defaults() -> Self {
        let script = Self::new();
        script.reply("AT+CPIN?", Reply::line("+CPIN: READY"));
        script.reply("AT+CGMI", Reply::line("Loopback"));
        script.reply("AT+CGMM", Reply::line("LB-1000"));
        script.reply("AT+CGMR", Reply::line("1.0.0"));
        script.reply("AT+CGSN", Reply::line("356938035643809"));
        script
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every `command` with `reply`.
    ///
    /// `command` is the text given to `cmd_start`, e.g. `"AT+CPIN?"` or `"AT+CPIN="`.
    pub fn reply(&self, command: &str, reply: Reply) {
        self.state()
            .replies
            .insert(command.to_string(), VecDeque::from([reply]));
    }

    /// Answer successive `command`s with `replies` in order; the last one repeats.
    pub fn reply_sequence<I>(&self, command: &str, replies: I)
    where
        I: IntoIterator<Item = Reply>,
    {
        self.state()
            .replies
            .insert(command.to_string(), replies.into_iter().collect());
    }

    /// Make the factory refuse to open `link`.
    pub fn make_unavailable(&self, link: LinkId) {
        self.state().unavailable.push(link);
    }

    /// Every command line sent, on any link, oldest first.
    pub fn transcript(&self) -> Vec<String> {
        self.state()
            .transcript
            .iter()
            .map(|entry| entry.line.clone())
            .collect()
    }

    pub fn transcript_for(&self, link: &LinkId) -> Vec<String> {
        self.state()
            .transcript
            .iter()
            .filter(|entry| entry.link == *link)
            .map(|entry| entry.line.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.state().transcript.clone()
    }

    /// Number of command lines sent that start with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .transcript
            .iter()
            .filter(|entry| entry.line.starts_with(prefix))
            .count()
    }

    pub fn clear_transcript(&self) {
        self.state().transcript.clear();
    }

    /// Current settings of the most recent channel opened for `link`.
    pub fn settings(&self, link: &LinkId) -> Option<ChannelConfig> {
        self.state().settings.get(link).copied()
    }

    pub fn channels_opened(&self) -> usize {
        self.state().opened
    }

    pub fn channels_closed(&self) -> usize {
        self.state().closed
    }

    pub fn channels_alive(&self) -> usize {
        let state = self.state();
        state.opened - state.closed
    }
}

/// Opens [`LoopbackModem`]s that all share one script.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    script: LoopbackScript,
}

impl LoopbackFactory {
    pub fn new(script: LoopbackScript) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &LoopbackScript {
        &self.script
    }
}

impl ChannelFactory for LoopbackFactory {
    fn open(&mut self, link: &LinkId, config: &ChannelConfig) -> DeviceResult<Box<dyn AtChannel>> {
        let mut state = self.script.state();
        if state.unavailable.contains(link) {
            return Err(DeviceError::NoConnection);
        }
        state.opened += 1;
        state.settings.insert(*link, *config);
        drop(state);

        Ok(Box::new(LoopbackModem {
            link: *link,
            config: *config,
            script: self.script.clone(),
            command: String::new(),
            line: String::new(),
            params: 0,
            pending: VecDeque::new(),
            field: None,
            error: Ok(()),
        }))
    }
}

/// One scripted channel.
#[derive(Debug)]
pub struct LoopbackModem {
    link: LinkId,
    config: ChannelConfig,
    script: LoopbackScript,
    command: String,
    line: String,
    params: usize,
    pending: VecDeque<String>,
    field: Option<String>,
    error: DeviceResult<()>,
}

impl LoopbackModem {
    fn push_param(&mut self, param: &str) {
        if self.params > 0 {
            self.line.push(',');
        }
        self.line.push_str(param);
        self.params += 1;
    }

    fn store_settings(&self) {
        self.script.state().settings.insert(self.link, self.config);
    }
}

impl AtChannel for LoopbackModem {
    fn link(&self) -> &LinkId {
        &self.link
    }

    fn lock(&mut self) {
        self.error = Ok(());
    }

    fn unlock(&mut self) {
        self.field = None;
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.field = None;
    }

    fn cmd_start(&mut self, cmd: &str) {
        self.command = cmd.to_string();
        self.line = cmd.to_string();
        self.params = 0;
        self.pending.clear();
        self.field = None;
    }

    fn write_int(&mut self, value: i32) {
        self.push_param(&value.to_string());
    }

    fn write_string(&mut self, value: &str) {
        self.push_param(&format!("\"{value}\""));
    }

    fn cmd_stop(&mut self) {
        if self.config.debug {
            debug!(link = %self.link, "AT> {}", self.line);
        }
        let mut state = self.script.state();
        state.transcript.push(TranscriptEntry {
            link: self.link,
            line: core::mem::take(&mut self.line),
        });
        let reply = state.next_reply(&self.command);
        drop(state);

        self.pending = reply.lines.into();
        if let Some(error) = reply.error {
            self.error = Err(error);
        }
    }

    fn resp_start(&mut self, prefix: &str) {
        self.field = None;
        if self.error.is_err() {
            return;
        }
        while let Some(line) = self.pending.pop_front() {
            if let Some(rest) = line.strip_prefix(prefix) {
                if self.config.debug {
                    debug!(link = %self.link, "AT< {}", line);
                }
                self.field = Some(rest.trim_start().to_string());
                return;
            }
        }
    }

    fn read_string(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.error.is_err() {
            return None;
        }
        let field = self.field.take()?;
        let len = field.len().min(buf.len());
        buf[..len].copy_from_slice(&field.as_bytes()[..len]);
        Some(len)
    }

    fn resp_stop(&mut self) {
        self.field = None;
        self.pending.clear();
    }

    fn last_error(&self) -> DeviceResult<()> {
        self.error
    }

    fn clear_error(&mut self) {
        self.error = Ok(());
    }

    fn set_timeout(&mut self, timeout_ms: u32, as_default: bool) {
        if as_default {
            self.config.timeout_ms = timeout_ms;
            self.store_settings();
        }
    }

    fn set_debug(&mut self, on: bool) {
        self.config.debug = on;
        self.store_settings();
    }
}

impl Drop for LoopbackModem {
    fn drop(&mut self) {
        self.script.state().closed += 1;
    }
}
