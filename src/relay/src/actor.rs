//! Actor propagation on the consuming side.
//!
//! Handlers receive the acting user explicitly. For code further down the call
//! chain the same value is visible through [`current`] while the handler runs;
//! the slot is task-local, so concurrently handled messages never share it.

use std::future::Future;

use crate::{config::ActorPolicy, envelope::UserId, error::ActorError};

tokio::task_local! {
    static CURRENT_ACTOR: Option<UserId>;
}

/// The actor of the change being handled, if any.
pub fn current() -> Option<UserId> {
    CURRENT_ACTOR.try_with(Clone::clone).ok().flatten()
}

/// Validates the actor of an inbound envelope against `policy`.
pub fn admit(user_id: Option<&UserId>, policy: ActorPolicy) -> Result<(), ActorError> {
    if let Some(leaked) = current() {
        return Err(ActorError::AlreadySet(leaked.to_string()));
    }
    match (user_id, policy) {
        (None, ActorPolicy::Required) => Err(ActorError::MissingUserId),
        _ => Ok(()),
    }
}

/// Runs `fut` with `actor` installed; the slot is cleared when `fut` finishes,
/// whether it succeeds, fails or panics.
pub async fn scope<F>(actor: Option<UserId>, fut: F) -> Result<F::Output, ActorError>
where
    F: Future,
{
    if let Some(leaked) = current() {
        return Err(ActorError::AlreadySet(leaked.to_string()));
    }
    Ok(CURRENT_ACTOR.scope(actor, fut).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn actor_is_visible_only_inside_the_scope() {
        assert_eq!(current(), None);
        let seen = scope(Some(UserId::from("u-1")), async { current() })
            .await
            .unwrap();
        assert_eq!(seen, Some(UserId::from("u-1")));
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn nested_scope_is_rejected() {
        let nested = scope(Some(UserId::from("outer")), async {
            scope(Some(UserId::from("inner")), async {}).await
        })
        .await
        .unwrap();
        assert!(matches!(nested, Err(ActorError::AlreadySet(actor)) if actor == "outer"));
    }

    #[test]
    fn missing_user_is_rejected_only_when_required() {
        assert!(matches!(
            admit(None, ActorPolicy::Required),
            Err(ActorError::MissingUserId)
        ));
        assert!(admit(None, ActorPolicy::Optional).is_ok());
        assert!(admit(Some(&UserId::from("u")), ActorPolicy::Required).is_ok());
    }
}
