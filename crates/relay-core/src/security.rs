use crate::domain::UserId;

// ============== Authorization ==============

/// Only the configured operator may drive the relay.
pub fn is_authorized(user_id: Option<UserId>, owner: UserId) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    owner.0 != 0 && user_id == owner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_owner_is_authorized() {
        let owner = UserId(42);
        assert!(is_authorized(Some(UserId(42)), owner));
        assert!(!is_authorized(Some(UserId(7)), owner));
        assert!(!is_authorized(None, owner));
    }

    #[test]
    fn zero_owner_authorizes_nobody() {
        assert!(!is_authorized(Some(UserId(0)), UserId(0)));
    }
}
