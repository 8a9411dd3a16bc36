//! Channel membership for Beacon.
//!
//! A channel is a named, many-to-many group of connections used for
//! multicast addressing. Membership lives only in these maps; nothing is
//! durable across reconnects. Channel names are opaque to the core.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

/// Thin membership contract used by topic code.
///
/// Both operations are idempotent: redundant adds and removes are not
/// errors and have no additional effect.
#[async_trait]
pub trait ChannelManager: Send + Sync {
    /// Add a connection to a named channel.
    async fn add_to_channel(&self, connection_id: &str, channel: &str);

    /// Remove a connection from a named channel.
    async fn remove_from_channel(&self, connection_id: &str, channel: &str);
}

/// Channel membership maps: channel -> members and connection -> channels.
#[derive(Debug, Default)]
pub struct Groups {
    members: DashMap<String, DashSet<String>>,
    memberships: DashMap<String, DashSet<String>>,
}

impl Groups {
    /// Create an empty membership store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a channel. Returns `true` if the membership is
    /// new; adding an existing member is a no-op.
    pub fn add(&self, connection_id: &str, channel: &str) -> bool {
        let added = self
            .members
            .entry(channel.to_string())
            .or_default()
            .insert(connection_id.to_string());

        if added {
            self.memberships
                .entry(connection_id.to_string())
                .or_default()
                .insert(channel.to_string());
            debug!(channel = %channel, connection = %connection_id, "Joined channel");
        }

        added
    }

    /// Remove a connection from a channel. Returns `true` if it was a
    /// member; removing a non-member is a no-op.
    pub fn remove(&self, connection_id: &str, channel: &str) -> bool {
        let mut removed = false;
        let mut now_empty = false;

        if let Some(entry) = self.members.get(channel) {
            removed = entry.remove(connection_id).is_some();
            now_empty = entry.is_empty();
        }

        if removed {
            if let Some(channels) = self.memberships.get(connection_id) {
                channels.remove(channel);
            }
            debug!(channel = %channel, connection = %connection_id, "Left channel");
        }

        // Empty channels have no identity of their own; drop the entry.
        if now_empty {
            self.members
                .remove_if(channel, |_, members| members.is_empty());
        }

        removed
    }

    /// Remove a connection from every channel it is in. Returns the
    /// channels it left.
    pub fn remove_connection(&self, connection_id: &str) -> Vec<String> {
        let Some((_, channels)) = self.memberships.remove(connection_id) else {
            return Vec::new();
        };

        let left: Vec<String> = channels.iter().map(|c| c.clone()).collect();
        for channel in &left {
            if let Some(entry) = self.members.get(channel) {
                entry.remove(connection_id);
                let empty = entry.is_empty();
                drop(entry);
                if empty {
                    self.members
                        .remove_if(channel, |_, members| members.is_empty());
                }
            }
        }

        debug!(connection = %connection_id, channels = left.len(), "Left all channels");
        left
    }

    /// Whether a connection is a member of a channel.
    #[must_use]
    pub fn is_member(&self, connection_id: &str, channel: &str) -> bool {
        self.members
            .get(channel)
            .map(|m| m.contains(connection_id))
            .unwrap_or(false)
    }

    /// Members of a channel.
    #[must_use]
    pub fn members(&self, channel: &str) -> Vec<String> {
        self.members
            .get(channel)
            .map(|m| m.iter().map(|c| c.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of members in a channel.
    #[must_use]
    pub fn member_count(&self, channel: &str) -> usize {
        self.members.get(channel).map(|m| m.len()).unwrap_or(0)
    }

    /// Channels a connection belongs to.
    #[must_use]
    pub fn channels_of(&self, connection_id: &str) -> Vec<String> {
        self.memberships
            .get(connection_id)
            .map(|c| c.iter().map(|x| x.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of channels with at least one member.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let groups = Groups::new();

        assert!(groups.add("conn-1", "room1"));
        assert!(!groups.add("conn-1", "room1"));

        // Membership is a set: still exactly one entry.
        assert_eq!(groups.member_count("room1"), 1);
        assert_eq!(groups.members("room1"), vec!["conn-1".to_string()]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let groups = Groups::new();
        groups.add("conn-1", "room1");

        assert!(groups.remove("conn-1", "room1"));
        assert!(!groups.remove("conn-1", "room1"));
        assert!(!groups.is_member("conn-1", "room1"));
    }

    #[test]
    fn test_many_to_many_membership() {
        let groups = Groups::new();
        groups.add("conn-1", "room1");
        groups.add("conn-1", "room2");
        groups.add("conn-2", "room1");

        assert_eq!(groups.member_count("room1"), 2);
        let mut channels = groups.channels_of("conn-1");
        channels.sort();
        assert_eq!(channels, vec!["room1".to_string(), "room2".to_string()]);
    }

    #[test]
    fn test_empty_channel_is_dropped() {
        let groups = Groups::new();
        groups.add("conn-1", "room1");
        assert_eq!(groups.channel_count(), 1);

        groups.remove("conn-1", "room1");
        assert_eq!(groups.channel_count(), 0);
    }

    #[test]
    fn test_remove_connection_leaves_everything() {
        let groups = Groups::new();
        groups.add("conn-1", "room1");
        groups.add("conn-1", "room2");
        groups.add("conn-2", "room1");

        let mut left = groups.remove_connection("conn-1");
        left.sort();
        assert_eq!(left, vec!["room1".to_string(), "room2".to_string()]);

        assert!(!groups.is_member("conn-1", "room1"));
        assert!(groups.is_member("conn-2", "room1"));
        assert!(groups.remove_connection("conn-1").is_empty());
    }
}
