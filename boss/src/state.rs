use std::{collections::HashMap, sync::Arc};

use comms::msg::{Msg, Solution};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub type BotId = u64;

#[derive(Debug)]
struct BotHandle {
    name: String,
    outbound: mpsc::Sender<Msg>,
}

/// The authoritative swarm-wide best plus the registry of connected bots.
#[derive(Debug, Default)]
struct SwarmBest {
    best: Option<Solution>,
    /// Error of the best at the time of the previous broadcast.
    last_broadcast: Option<f64>,
    /// Every solution accepted this run, in arrival order.
    history: Vec<Solution>,
    bots: HashMap<BotId, BotHandle>,
    next_id: BotId,
}

/// Clonable handle sharing one `SwarmBest` between the per-connection
/// handlers and the broadcast task. Locks are short and never held across
/// an await.
#[derive(Debug, Clone, Default)]
pub struct SwarmHandle {
    inner: Arc<Mutex<SwarmBest>>,
}

impl SwarmHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection and returns its id. The bot
    /// renames itself when its `join` arrives.
    pub fn register(&self, outbound: mpsc::Sender<Msg>) -> BotId {
        let mut swarm = self.inner.lock();
        let id = swarm.next_id;
        swarm.next_id += 1;
        swarm.bots.insert(
            id,
            BotHandle {
                name: format!("bot-{id}"),
                outbound,
            },
        );
        id
    }

    pub fn set_name(&self, id: BotId, name: &str) {
        if let Some(bot) = self.inner.lock().bots.get_mut(&id) {
            bot.name = name.to_string();
        }
    }

    pub fn unregister(&self, id: BotId) {
        self.inner.lock().bots.remove(&id);
    }

    pub fn bot_count(&self) -> usize {
        self.inner.lock().bots.len()
    }

    /// Whether a reported error would beat the current best. A yes is only
    /// a hint to ask for the full vector; acceptance is re-decided when the
    /// vector arrives.
    pub fn report_improves(&self, error: f64) -> bool {
        self.inner.lock().best.as_ref().is_none_or(|b| error < b.error)
    }

    /// Installs `solution` as the swarm best if it still strictly beats it.
    ///
    /// The re-check matters: between asking a bot for its vector and the
    /// vector arriving, another bot may have landed something better.
    pub fn accept(&self, solution: Solution) -> bool {
        let mut swarm = self.inner.lock();
        if swarm.best.as_ref().is_some_and(|b| solution.error >= b.error) {
            return false;
        }
        swarm.history.push(solution.clone());
        swarm.best = Some(solution);
        true
    }

    /// Installs a starting best without recording an acceptance, e.g. one
    /// reloaded from a previous run's log. It reaches bots through join
    /// replies instead of a broadcast.
    pub fn seed(&self, solution: Solution) {
        let mut swarm = self.inner.lock();
        swarm.last_broadcast = Some(solution.error);
        swarm.best = Some(solution);
    }

    pub fn best_solution(&self) -> Option<Solution> {
        self.inner.lock().best.clone()
    }

    pub fn best_error(&self) -> Option<f64> {
        self.inner.lock().best.as_ref().map(|b| b.error)
    }

    /// The current best, if it improved since the previous call.
    pub fn take_broadcast(&self) -> Option<Solution> {
        let mut swarm = self.inner.lock();
        let error = swarm.best.as_ref().map(|b| b.error)?;
        if swarm.last_broadcast.is_some_and(|last| error >= last) {
            return None;
        }
        swarm.last_broadcast = Some(error);
        swarm.best.clone()
    }

    /// Outbound queues of every connected bot.
    pub fn senders(&self) -> Vec<mpsc::Sender<Msg>> {
        self.inner
            .lock()
            .bots
            .values()
            .map(|b| b.outbound.clone())
            .collect()
    }

    /// Accepted solutions in arrival order, oldest first.
    pub fn history(&self) -> Vec<Solution> {
        self.inner.lock().history.clone()
    }
}
