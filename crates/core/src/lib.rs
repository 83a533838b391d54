#![forbid(unsafe_code)]

pub mod lookup;
pub mod model;
pub mod tags;

pub use lookup::Lookup;
pub use model::*;
pub use tags::*;

pub mod ids {
    use serde::Serialize;

    macro_rules! row_id {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
            #[serde(transparent)]
            pub struct $name(i64);

            impl $name {
                pub const fn new(value: i64) -> Self {
                    Self(value)
                }

                pub const fn get(self) -> i64 {
                    self.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        };
    }

    row_id!(ProjectId);
    row_id!(BranchId);
    row_id!(
        /// Stable identity shared by every version of a tag, header or entry.
        ItemId
    );
    row_id!(ItemVersionId);
    row_id!(
        /// Change ordinal. Ids grow monotonically, so the largest committed id
        /// on a branch is its head.
        ChangeId
    );
    row_id!(ChangeVersionId);
    row_id!(BranchHistoryId);

    impl ChangeId {
        /// Placeholder referenced by a pending-change slot while the real
        /// change is still being allocated. No branch can own it.
        pub const SENTINEL: ChangeId = ChangeId(0);

        pub fn is_sentinel(self) -> bool {
            self == Self::SENTINEL
        }
    }

    /// Authenticated caller identity. Authorization has already happened by
    /// the time one of these reaches the engine.
    #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
    #[serde(transparent)]
    pub struct ActorId(String);

    impl ActorId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, ActorIdError> {
            let value = value.into();
            validate_actor_id(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for ActorId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ActorIdError {
        Empty,
        TooLong,
        ContainsControl,
    }

    impl ActorIdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "actor id must not be empty",
                Self::TooLong => "actor id is too long",
                Self::ContainsControl => "actor id contains control characters",
            }
        }
    }

    fn validate_actor_id(value: &str) -> Result<(), ActorIdError> {
        if value.trim().is_empty() {
            return Err(ActorIdError::Empty);
        }
        if value.len() > 128 {
            return Err(ActorIdError::TooLong);
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(ActorIdError::ContainsControl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ids::*;

    #[test]
    fn actor_id_validation() {
        assert_eq!(ActorId::try_new("").unwrap_err(), ActorIdError::Empty);
        assert_eq!(ActorId::try_new("   ").unwrap_err(), ActorIdError::Empty);
        assert_eq!(
            ActorId::try_new("a".repeat(129)).unwrap_err(),
            ActorIdError::TooLong
        );
        assert_eq!(
            ActorId::try_new("u\u{0000}1").unwrap_err(),
            ActorIdError::ContainsControl
        );
        assert_eq!(ActorId::try_new("ga-user-12").unwrap().as_str(), "ga-user-12");
    }

    #[test]
    fn sentinel_change_is_reserved() {
        assert!(ChangeId::SENTINEL.is_sentinel());
        assert!(!ChangeId::new(1).is_sentinel());
        assert_eq!(ChangeId::new(42).get(), 42);
        assert_eq!(BranchId::new(7).to_string(), "7");
    }
}
