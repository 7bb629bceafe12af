//! The local progress meter: state, throttling, rendering, and the
//! lifecycle hook seam the remote mirror plugs into.

mod format;
mod iter;

pub use iter::{MeterIter, MeterIterExt};

use std::time::{Duration, Instant};

use tracing::warn;

use crate::mirror::{RemoteMirror, REMOTE_MININTERVAL};
use crate::sink::discord::DiscordConfig;
use crate::sink::telegram::TelegramConfig;
use crate::term::DrawTarget;

/// Minimum interval between local redraws when none is configured.
pub const DEFAULT_MININTERVAL: Duration = Duration::from_millis(100);
/// Local bar width when none is configured.
pub const DEFAULT_WIDTH: usize = 30;

/// Lifecycle hooks a meter drives at its display, clear, and close points.
///
/// Hooks are composed onto a meter instead of subclassed into it;
/// [`RemoteMirror`] is the crate's main implementation.
pub trait MeterHooks: Send {
    /// A redraw was due and `snapshot` is the state that was rendered.
    fn on_display(&mut self, snapshot: &Snapshot);
    /// The display was blanked.
    fn on_clear(&mut self, snapshot: &Snapshot);
    /// The meter closed; `snapshot` carries the final state and the
    /// leave/position fields the hook needs for its teardown policy.
    fn on_close(&mut self, snapshot: &Snapshot);
}

/// Construction parameters for a [`Meter`].
#[derive(Debug, Clone)]
pub struct MeterConfig {
    /// Prefix label shown before the bar.
    pub desc: Option<String>,
    /// Expected number of iterations; `None` renders a plain counter.
    pub total: Option<u64>,
    /// Minimum interval between redraws. `None` picks
    /// [`DEFAULT_MININTERVAL`], or the 1-second remote default when a chat
    /// mirror is attached.
    pub mininterval: Option<Duration>,
    /// Keep the finished bar visible. `None` keeps only position-0 bars.
    pub leave: Option<bool>,
    /// Row offset for stacked bars.
    pub position: usize,
    /// Disable all output; a disabled meter never creates network resources.
    pub disable: bool,
    /// Optional line template with `{desc}`, `{percent}`, `{bar}`, `{n}`,
    /// `{total}`, `{elapsed}`, `{eta}`, and `{rate}` tokens.
    pub bar_format: Option<String>,
    /// Local bar width in character cells.
    pub width: usize,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            desc: None,
            total: None,
            mininterval: None,
            leave: None,
            position: 0,
            disable: false,
            bar_format: None,
            width: DEFAULT_WIDTH,
        }
    }
}

/// Point-in-time view of a meter, sufficient to render count, total, rate,
/// ETA, and the bar.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Prefix label.
    pub desc: Option<String>,
    /// Current count.
    pub n: u64,
    /// Expected total, if known.
    pub total: Option<u64>,
    /// Time since the meter started.
    pub elapsed: Duration,
    /// Average iterations per second, once any progress was made.
    pub rate: Option<f64>,
    /// Leave policy as configured.
    pub leave: Option<bool>,
    /// Stacking position.
    pub position: usize,
    /// Whether the meter is disabled.
    pub disable: bool,
    /// Line template as configured.
    pub bar_format: Option<String>,
}

impl Snapshot {
    /// Remaining-time estimate from the average rate.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let remaining = total.checked_sub(self.n)?;
        let rate = self.rate?;
        if rate <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = remaining as f64 / rate;
        Some(Duration::from_secs_f64(secs))
    }

    /// Render the one-line meter text with the bar at `bar_width` cells.
    #[must_use]
    pub fn format_meter(&self, bar_width: usize) -> String {
        format::format_meter(self, bar_width)
    }
}

/// A terminal progress meter with pluggable lifecycle hooks.
///
/// `update` is cheap and never blocks: redraws are throttled by the
/// configured minimum interval, and anything a hook mirrors remotely runs on
/// that hook's own worker thread.
pub struct Meter {
    config: MeterConfig,
    mininterval: Duration,
    n: u64,
    started: Instant,
    last_draw: Option<Instant>,
    closed: bool,
    hooks: Vec<Box<dyn MeterHooks>>,
    target: DrawTarget,
}

impl Meter {
    /// A plain local meter with no hooks.
    #[must_use]
    pub fn new(config: MeterConfig) -> Self {
        Self::with_hooks(config, Vec::new())
    }

    /// A meter with the given lifecycle hooks already attached.
    ///
    /// The initial zero state is displayed (and mirrored) immediately
    /// unless the meter is disabled.
    #[must_use]
    pub fn with_hooks(config: MeterConfig, hooks: Vec<Box<dyn MeterHooks>>) -> Self {
        let mininterval = config.mininterval.unwrap_or(DEFAULT_MININTERVAL);
        let mut meter = Self {
            mininterval,
            n: 0,
            started: Instant::now(),
            last_draw: None,
            closed: false,
            hooks,
            target: DrawTarget::stderr(),
            config,
        };
        meter.refresh();
        meter
    }

    /// A meter mirrored to a Telegram chat.
    ///
    /// The mirror is only constructed when the meter is not disabled, so a
    /// disabled meter never touches the network. If the backend cannot be
    /// configured the meter degrades to local-only with a logged warning.
    /// The redraw interval defaults to one second to keep the edit rate
    /// within bot API limits.
    #[must_use]
    pub fn with_telegram(mut config: MeterConfig, telegram: TelegramConfig) -> Self {
        let _ = config.mininterval.get_or_insert(REMOTE_MININTERVAL);
        let mut hooks: Vec<Box<dyn MeterHooks>> = Vec::new();
        if !config.disable {
            match RemoteMirror::telegram(telegram) {
                Ok(mirror) => hooks.push(Box::new(mirror)),
                Err(e) => warn!(error = %e, "telegram mirror disabled"),
            }
        }
        Self::with_hooks(config, hooks)
    }

    /// A meter mirrored to a Discord channel; see
    /// [`with_telegram`](Self::with_telegram) for the shared semantics.
    #[must_use]
    pub fn with_discord(mut config: MeterConfig, discord: DiscordConfig) -> Self {
        let _ = config.mininterval.get_or_insert(REMOTE_MININTERVAL);
        let mut hooks: Vec<Box<dyn MeterHooks>> = Vec::new();
        if !config.disable {
            match RemoteMirror::discord(discord) {
                Ok(mirror) => hooks.push(Box::new(mirror)),
                Err(e) => warn!(error = %e, "discord mirror disabled"),
            }
        }
        Self::with_hooks(config, hooks)
    }

    /// Attach another lifecycle hook.
    pub fn add_hook(&mut self, hook: Box<dyn MeterHooks>) {
        self.hooks.push(hook);
    }

    /// Advance the count by `delta`, redrawing if the throttle interval has
    /// elapsed.
    pub fn update(&mut self, delta: u64) {
        self.n = self.n.saturating_add(delta);
        self.maybe_display();
    }

    /// Set the absolute count; monotonicity is not enforced.
    pub fn set(&mut self, n: u64) {
        self.n = n;
        self.maybe_display();
    }

    /// Current count.
    #[must_use]
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Force a redraw regardless of the throttle.
    pub fn refresh(&mut self) {
        if !self.config.disable && !self.closed {
            self.display();
        }
    }

    /// Blank the bar line locally and on every hook.
    pub fn clear(&mut self) {
        if self.config.disable {
            return;
        }
        self.target.clear(self.config.position);
        let snapshot = self.snapshot();
        for hook in &mut self.hooks {
            hook.on_clear(&snapshot);
        }
    }

    /// Print `msg` on its own line above the bar.
    pub fn write(&self, msg: &str) {
        self.target.println(msg);
    }

    /// Writer factory for routing `tracing` output above the bar; see
    /// [`crate::logging`].
    #[must_use]
    pub fn log_writer(&self) -> crate::logging::MakeMeterWriter {
        crate::logging::MakeMeterWriter::new(self.target.clone())
    }

    /// Finish the meter: draw the final state, apply the leave policy to
    /// the local line, and fire `on_close` on every hook. Idempotent; a
    /// disabled meter does nothing at all.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.config.disable {
            self.closed = true;
            return;
        }
        self.display();
        self.closed = true;
        let keep = self.config.leave.unwrap_or(self.config.position == 0);
        if keep {
            self.target.leave();
        } else {
            self.target.clear(self.config.position);
        }
        let snapshot = self.snapshot();
        for hook in &mut self.hooks {
            hook.on_close(&snapshot);
        }
    }

    /// Immutable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let rate = (self.n > 0 && secs > 1e-9).then(|| self.n as f64 / secs);
        Snapshot {
            desc: self.config.desc.clone(),
            n: self.n,
            total: self.config.total,
            elapsed,
            rate,
            leave: self.config.leave,
            position: self.config.position,
            disable: self.config.disable,
            bar_format: self.config.bar_format.clone(),
        }
    }

    fn maybe_display(&mut self) {
        if self.config.disable || self.closed {
            return;
        }
        let due = self
            .last_draw
            .map_or(true, |last| last.elapsed() >= self.mininterval);
        if due {
            self.display();
        }
    }

    fn display(&mut self) {
        self.last_draw = Some(Instant::now());
        let snapshot = self.snapshot();
        let line = snapshot.format_meter(self.config.width);
        self.target.draw(self.config.position, &line);
        for hook in &mut self.hooks {
            hook.on_display(&snapshot);
        }
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.close();
    }
}
