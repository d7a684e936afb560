use crate::common::{PeerId, User};

/// Shown for ids that never appeared in the roster.
pub const UNKNOWN_USER: &str = "Unknown";

/// Client-side mirror of the relay's roster, never containing ourselves.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    local_id: PeerId,
    users: Vec<User>,
}

impl Roster {
    pub fn new(local_id: impl Into<PeerId>) -> Self {
        Self {
            local_id: local_id.into(),
            users: Vec::new(),
        }
    }

    /// Replaces the mirror with a `userList` payload and returns the result.
    pub fn replace(&mut self, entries: Vec<(PeerId, String)>) -> Vec<User> {
        self.users = entries
            .into_iter()
            .filter(|(id, _)| *id != self.local_id)
            .map(|(id, username)| User { id, username })
            .collect();
        self.users.clone()
    }

    /// Adds or renames a user; returns `false` for our own id.
    pub fn upsert(&mut self, user: User) -> bool {
        if user.id == self.local_id {
            return false;
        }
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => existing.username = user.username,
            None => self.users.push(user),
        }
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<User> {
        let index = self.users.iter().position(|u| u.id == id)?;
        Some(self.users.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Username for `id`, or [`UNKNOWN_USER`].
    pub fn display_name(&self, id: &str) -> &str {
        self.get(id)
            .map(|u| u.username.as_str())
            .unwrap_or(UNKNOWN_USER)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_id_never_enters_the_mirror() {
        let mut roster = Roster::new("me");
        let users = roster.replace(vec![
            ("me".into(), "self".into()),
            ("a".into(), "alice".into()),
        ]);
        assert_eq!(users.len(), 1);
        assert!(!roster.upsert(User {
            id: "me".into(),
            username: "self".into()
        }));
        assert_eq!(roster.users().len(), 1);
    }

    #[test]
    fn unknown_ids_get_placeholder() {
        let mut roster = Roster::new("me");
        roster.upsert(User {
            id: "a".into(),
            username: "alice".into(),
        });
        assert_eq!(roster.display_name("a"), "alice");
        assert_eq!(roster.display_name("zz"), UNKNOWN_USER);

        roster.remove("a");
        assert_eq!(roster.display_name("a"), UNKNOWN_USER);
    }
}
