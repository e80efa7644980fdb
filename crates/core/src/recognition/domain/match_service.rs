use crate::recognition::domain::descriptor::Descriptor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(String),
    NoMatch,
}

/// Resolves a descriptor to a person's name.
///
/// Infallible by contract: timeouts, transport errors and malformed replies
/// all surface as [`MatchOutcome::NoMatch`].
pub trait MatchService: Send + Sync {
    fn find(&self, descriptor: &Descriptor) -> MatchOutcome;
}
