//! Eviction policies of the tabulation cache.
//!
//! A policy only sees a snapshot of `LeafUsage` records, never the shape of the tree.
//! The cache deletes the selected victims, then resets the retrieve counters of the
//! survivors so that frequency-based ranking starts afresh for the next sweep.
use super::tab_entry::{EntryId, LeafUsage};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

/// Policy selected in the configuration file by its `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[enum_dispatch(Evict)]
pub enum EvictionPolicy {
    LeastRetrieved(LeastRetrieved),
    LeastRecentlyUsed(LeastRecentlyUsed),
    MaxLifetime(MaxLifetime),
    ClearAll(ClearAll),
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::LeastRetrieved(LeastRetrieved::default())
    }
}

#[enum_dispatch]
pub trait Evict {
    /// entries to delete when the table is full
    fn select_victims(&self, usage: &[LeafUsage], capacity: usize, tick: u64) -> Vec<EntryId>;
    /// entries to delete on a routine maintenance pass
    fn expired(&self, _usage: &[LeafUsage], _tick: u64) -> Vec<EntryId> {
        Vec::new()
    }
    fn label(&self) -> String;
    /// checks of the policy parameters
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// number of entries to drop so that `keep_fraction * capacity` remain
fn excess(len: usize, capacity: usize, keep_fraction: f64) -> usize {
    let target = (keep_fraction * capacity as f64).floor() as usize;
    len.saturating_sub(target)
}

fn check_fraction(keep_fraction: f64) -> Result<(), String> {
    if (0.0..1.0).contains(&keep_fraction) {
        Ok(())
    } else {
        Err(format!(
            "keep_fraction must be in [0, 1), got {}",
            keep_fraction
        ))
    }
}

/// Drops the entries with the fewest retrieves since the last sweep; ties go to the
/// entries unused for the longest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeastRetrieved {
    pub keep_fraction: f64,
}

impl Default for LeastRetrieved {
    fn default() -> Self {
        Self { keep_fraction: 0.7 }
    }
}

impl Evict for LeastRetrieved {
    fn select_victims(&self, usage: &[LeafUsage], capacity: usize, _tick: u64) -> Vec<EntryId> {
        let n = excess(usage.len(), capacity, self.keep_fraction);
        let mut ranked = usage.to_vec();
        ranked.sort_by_key(|u| (u.retrieve_count, u.last_used, u.born));
        ranked.into_iter().take(n).map(|u| u.id).collect()
    }

    fn label(&self) -> String {
        format!("least retrieved (keep {:.0}%)", 100.0 * self.keep_fraction)
    }

    fn validate(&self) -> Result<(), String> {
        check_fraction(self.keep_fraction)
    }
}

/// Drops the entries unused for the longest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeastRecentlyUsed {
    pub keep_fraction: f64,
}

impl Default for LeastRecentlyUsed {
    fn default() -> Self {
        Self { keep_fraction: 0.7 }
    }
}

impl Evict for LeastRecentlyUsed {
    fn select_victims(&self, usage: &[LeafUsage], capacity: usize, _tick: u64) -> Vec<EntryId> {
        let n = excess(usage.len(), capacity, self.keep_fraction);
        let mut ranked = usage.to_vec();
        ranked.sort_by_key(|u| (u.last_used, u.retrieve_count, u.born));
        ranked.into_iter().take(n).map(|u| u.id).collect()
    }

    fn label(&self) -> String {
        format!("least recently used (keep {:.0}%)", 100.0 * self.keep_fraction)
    }

    fn validate(&self) -> Result<(), String> {
        check_fraction(self.keep_fraction)
    }
}

/// Drops entries older than `max_age` ticks or idle for more than `max_idle` ticks.
/// A zero limit is disabled. If nothing has expired when the table is full, the table
/// is allowed to grow beyond its capacity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxLifetime {
    pub max_age: u64,
    pub max_idle: u64,
}

impl Evict for MaxLifetime {
    fn select_victims(&self, usage: &[LeafUsage], _capacity: usize, tick: u64) -> Vec<EntryId> {
        self.expired(usage, tick)
    }

    fn expired(&self, usage: &[LeafUsage], tick: u64) -> Vec<EntryId> {
        usage
            .iter()
            .filter(|u| {
                (self.max_age > 0 && tick.saturating_sub(u.born) > self.max_age)
                    || (self.max_idle > 0 && tick.saturating_sub(u.last_used) > self.max_idle)
            })
            .map(|u| u.id)
            .collect()
    }

    fn label(&self) -> String {
        format!(
            "max lifetime (age {}, idle {})",
            self.max_age, self.max_idle
        )
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_age == 0 && self.max_idle == 0 {
            return Err("max lifetime policy needs max_age or max_idle".to_string());
        }
        Ok(())
    }
}

/// Throws the whole table away.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClearAll {}

impl Evict for ClearAll {
    fn select_victims(&self, usage: &[LeafUsage], _capacity: usize, _tick: u64) -> Vec<EntryId> {
        usage.iter().map(|u| u.id).collect()
    }

    fn label(&self) -> String {
        "clear all".to_string()
    }
}
