// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parked-agent registry.
//!
//! Holds live tutor subprocesses across brief WebSocket disconnects so a
//! reconnect within the TTL gets the same subprocess back. Capacity is
//! tiny and a full registry refuses new parks (the caller closes the
//! agent) rather than evicting someone else's still-valid session.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agent::TutorAgent;

pub const MAX_PARKED: usize = 5;
pub const PARK_TTL: Duration = Duration::from_secs(300);

struct ParkedAgent {
    agent: TutorAgent,
    parked_at: Instant,
    problem_id: String,
}

/// Process-wide registry of parked agents. Coarse mutex; the map never
/// exceeds [`MAX_PARKED`] entries.
#[derive(Default)]
pub struct TutorRegistry {
    inner: Mutex<HashMap<String, ParkedAgent>>,
}

impl TutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an agent. Returns the agent back to the caller when the
    /// registry is full; the caller must close it.
    pub async fn park(&self, agent: TutorAgent) -> Result<(), TutorAgent> {
        let now = Instant::now();
        let session_id = agent.session_id().to_owned();
        let problem_id = agent.problem_id().to_owned();

        let (expired, rejected) = {
            let mut map = self.inner.lock().await;
            let expired = drain_expired(&mut map, now);
            if map.len() >= MAX_PARKED {
                (expired, Some(agent))
            } else {
                map.insert(
                    session_id.clone(),
                    ParkedAgent { agent, parked_at: now, problem_id },
                );
                (expired, None)
            }
        };
        close_all(expired).await;
        match rejected {
            Some(agent) => {
                info!(session = %session_id, "registry full; refusing park");
                Err(agent)
            }
            None => {
                debug!(session = %session_id, "agent parked");
                Ok(())
            }
        }
    }

    /// Remove and return the agent for a session, if parked and fresh.
    pub async fn reclaim(&self, session_id: &str) -> Option<TutorAgent> {
        let now = Instant::now();
        let (hit, expired) = {
            let mut map = self.inner.lock().await;
            let expired = drain_expired(&mut map, now);
            (map.remove(session_id), expired)
        };
        close_all(expired).await;
        let hit = hit?;
        debug!(session = %session_id, problem = %hit.problem_id, "agent reclaimed");
        Some(hit.agent)
    }

    /// Drop every expired entry, closing its agent. Runs lazily on every
    /// park/reclaim as well.
    pub async fn expire_scan(&self) {
        let expired = {
            let mut map = self.inner.lock().await;
            drain_expired(&mut map, Instant::now())
        };
        close_all(expired).await;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Pull expired entries out of the map. Closing happens outside the
/// lock; an agent close can take seconds.
fn drain_expired(map: &mut HashMap<String, ParkedAgent>, now: Instant) -> Vec<TutorAgent> {
    let stale: Vec<String> = map
        .iter()
        .filter(|(_, p)| now.duration_since(p.parked_at) > PARK_TTL)
        .map(|(id, _)| id.clone())
        .collect();
    stale
        .into_iter()
        .filter_map(|id| {
            info!(session = %id, "parked agent expired");
            map.remove(&id).map(|p| p.agent)
        })
        .collect()
}

async fn close_all(agents: Vec<TutorAgent>) {
    for mut agent in agents {
        agent.close().await;
    }
}

#[cfg(test)]
impl TutorRegistry {
    /// Backdate an entry's park time so expiry is testable.
    pub(crate) async fn age_entry(&self, session_id: &str, by: Duration) {
        let mut map = self.inner.lock().await;
        if let Some(parked) = map.get_mut(session_id) {
            parked.parked_at -= by;
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
