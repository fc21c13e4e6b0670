use std::collections::HashSet;

use chrono::{DateTime, Utc};

/* Chat event model.
 * A ChatMessage is the only thing the core consumes from the transport.
 * Roles are resolved once, when the transport parses the raw event, so
 * downstream code never inspects badge maps or other transport details.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Moderator,
    Vip,
    Broadcaster,
    Subscriber,
}

#[derive(Debug, Clone)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    roles: HashSet<Role>,
}

impl ChatUser {
    pub fn new(id: &str, name: &str, roles: impl IntoIterator<Item = Role>) -> Self {
        ChatUser {
            id: id.to_string(),
            name: name.to_string(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_mod(&self) -> bool {
        self.has_role(Role::Moderator)
    }

    pub fn is_vip(&self) -> bool {
        self.has_role(Role::Vip)
    }

    pub fn is_broadcaster(&self) -> bool {
        self.has_role(Role::Broadcaster)
    }

    // Mods, VIPs and the broadcaster can run privileged overlay commands.
    pub fn is_elevated(&self) -> bool {
        self.is_mod() || self.is_vip() || self.is_broadcaster()
    }
}

// Immutable per dispatch cycle.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub channel_id: String,
    pub user: ChatUser,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(channel_id: &str, user: ChatUser, text: &str) -> Self {
        ChatMessage {
            channel_id: channel_id.to_string(),
            user,
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    // First whitespace-separated token, lowercased. Command lookup key.
    pub fn first_token(&self) -> String {
        self.text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    // Everything after the first token, trimmed.
    pub fn rest(&self) -> &str {
        match self.text.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }
}
