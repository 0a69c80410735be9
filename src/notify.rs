//! Toast notifications and the offline badge.
//!
//! Rendering is left to the implementor: a notifier only needs somewhere to
//! append a transient message, a badge only needs to be shown or hidden.

use std::io::Write;
use tracing::info;

use crate::connectivity::Connectivity;
use crate::sync::SyncOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
  Ok,
  Warn,
  Error,
}

impl ToastKind {
  fn label(&self) -> &'static str {
    match self {
      ToastKind::Ok => "ok",
      ToastKind::Warn => "warn",
      ToastKind::Error => "error",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
  pub title: String,
  pub message: Option<String>,
  pub kind: ToastKind,
}

impl Toast {
  pub fn new(title: impl Into<String>, kind: ToastKind) -> Self {
    Self {
      title: title.into(),
      message: None,
      kind,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }
}

pub trait Notifier {
  fn notify(&mut self, toast: Toast);
}

pub trait StatusBadge {
  fn set_hidden(&mut self, hidden: bool);
}

/// The badge is visible only while offline.
pub fn update_badge(badge: &mut impl StatusBadge, connectivity: Connectivity) {
  badge.set_hidden(connectivity == Connectivity::Online);
}

/// Toast describing a sync attempt, if it is worth telling the user about.
pub fn sync_toast(outcome: &SyncOutcome) -> Option<Toast> {
  match outcome {
    SyncOutcome::NothingQueued | SyncOutcome::AlreadyRunning => None,
    SyncOutcome::Synced { submitted, .. } => Some(
      Toast::new("Synced", ToastKind::Ok)
        .with_message(format!("{} queued operation(s) sent", submitted)),
    ),
    SyncOutcome::Failed(e) => Some(
      Toast::new("Sync failed", ToastKind::Warn)
        .with_message(format!("{}. Will retry when back online.", e)),
    ),
  }
}

/// Writes toasts as single lines to a terminal stream.
pub struct TerminalNotifier<W: Write> {
  out: W,
}

impl TerminalNotifier<std::io::Stderr> {
  pub fn stderr() -> Self {
    Self::new(std::io::stderr())
  }
}

impl<W: Write> TerminalNotifier<W> {
  pub fn new(out: W) -> Self {
    Self { out }
  }
}

impl<W: Write> Notifier for TerminalNotifier<W> {
  fn notify(&mut self, toast: Toast) {
    info!(kind = toast.kind.label(), title = %toast.title, "toast");
    let line = match &toast.message {
      Some(message) => format!("[{}] {}: {}", toast.kind.label(), toast.title, message),
      None => format!("[{}] {}", toast.kind.label(), toast.title),
    };
    // A closed terminal is not worth failing over
    let _ = writeln!(self.out, "{}", line);
  }
}

/// Prints a line whenever the badge appears or disappears.
pub struct TerminalBadge<W: Write> {
  out: W,
  hidden: Option<bool>,
}

impl TerminalBadge<std::io::Stderr> {
  pub fn stderr() -> Self {
    Self::new(std::io::stderr())
  }
}

impl<W: Write> TerminalBadge<W> {
  pub fn new(out: W) -> Self {
    Self { out, hidden: None }
  }

  pub fn is_hidden(&self) -> bool {
    self.hidden.unwrap_or(true)
  }
}

impl<W: Write> StatusBadge for TerminalBadge<W> {
  fn set_hidden(&mut self, hidden: bool) {
    if self.hidden == Some(hidden) {
      return;
    }
    let first = self.hidden.is_none();
    self.hidden = Some(hidden);

    let line = match (hidden, first) {
      (false, _) => Some("● offline"),
      (true, false) => Some("● online"),
      // Initially online: nothing to show
      (true, true) => None,
    };
    if let Some(line) = line {
      let _ = writeln!(self.out, "{}", line);
    }
  }
}
