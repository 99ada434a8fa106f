//! Core traits shared by attachment owners and records

/// Primary key type
pub type Id = i64;

/// Trait for entities that have a primary key
pub trait Identifiable {
    fn id(&self) -> Option<Id>;
    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }
    fn is_new_record(&self) -> bool {
        !self.is_persisted()
    }
}

/// An entity that owns attachment fields.
///
/// The class name is written into attachment tokens, so it must stay stable
/// for links that were already handed out.
pub trait ParentEntity: Send + Sync {
    /// Fully qualified entity class name (e.g. `Acme\Bundle\Entity\Contact`)
    fn entity_class(&self) -> &str;

    /// Persisted identifier of the entity
    fn entity_id(&self) -> Id;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record(Option<Id>);

    impl Identifiable for Record {
        fn id(&self) -> Option<Id> {
            self.0
        }
    }

    #[test]
    fn test_persisted_state() {
        assert!(Record(Some(1)).is_persisted());
        assert!(Record(None).is_new_record());
    }
}
