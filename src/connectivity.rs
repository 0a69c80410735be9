use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// A change in observed connectivity. `from` is `None` for the first observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub from: Option<Connectivity>,
  pub to: Connectivity,
}

impl Transition {
  /// Offline to online: the moment queued operations should be flushed
  pub fn is_reconnect(&self) -> bool {
    self.from == Some(Connectivity::Offline) && self.to == Connectivity::Online
  }
}

/// Turns a stream of observations into transitions.
#[derive(Debug, Default)]
pub struct ConnectivityTracker {
  current: Option<Connectivity>,
}

impl ConnectivityTracker {
  pub fn current(&self) -> Option<Connectivity> {
    self.current
  }

  /// Record an observation. Returns a transition only when the state changed.
  pub fn observe(&mut self, observed: Connectivity) -> Option<Transition> {
    if self.current == Some(observed) {
      return None;
    }
    let transition = Transition {
      from: self.current,
      to: observed,
    };
    self.current = Some(observed);
    Some(transition)
  }
}

/// Probes connectivity on a fixed interval and reports transitions
pub struct ConnectivityMonitor {
  rx: mpsc::UnboundedReceiver<Transition>,
}

impl ConnectivityMonitor {
  /// Spawn a probe loop. The first probe runs immediately.
  pub fn spawn<P, Fut>(interval: Duration, probe: P) -> Self
  where
    P: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Connectivity> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut tracker = ConnectivityTracker::default();
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

      loop {
        ticker.tick().await;
        let observed = probe().await;
        if let Some(transition) = tracker.observe(observed) {
          debug!(?transition, "connectivity changed");
          if tx.send(transition).is_err() {
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Receive the next transition
  pub async fn next(&mut self) -> Option<Transition> {
    self.rx.recv().await
  }
}

/// Any HTTP answer counts as online; only a failed request is offline.
/// A probe that takes longer than `timeout` is a failure.
pub async fn probe_http(client: &Client, url: Url, timeout: Duration) -> Connectivity {
  match client.head(url).timeout(timeout).send().await {
    Ok(_) => Connectivity::Online,
    Err(e) => {
      debug!(error = %e, "probe failed");
      Connectivity::Offline
    }
  }
}
