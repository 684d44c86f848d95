//! Dense identifiers for the simulation arenas.
//!
//! Every entity with a cyclic relationship (request ↔ dependency ↔
//! child request, instance ↔ service) lives in an arena owned by the
//! `Simulation`; edges between them are these ids. Ids are assigned in
//! creation order and never reused within a run, so ordering by id is
//! ordering by age.

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Builds an id from a raw arena index. Only meaningful for
            /// indices handed out by the owning simulation.
            pub fn from_index(index: usize) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
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

arena_id!(
    /// A microservice in the architecture.
    ServiceId
);
arena_id!(
    /// One replica of a microservice.
    InstanceId
);
arena_id!(
    /// A request flowing through the service graph.
    RequestId
);
arena_id!(
    /// One in-flight network transmission (request or answer).
    TransmissionId
);

/// An operation, addressed by its owning service and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationRef {
    pub service: ServiceId,
    pub index: usize,
}

impl std::fmt::Display for OperationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.service, self.index)
    }
}
