//! Contract between a game session and the neural-network policy it plays with.

/// Maps an observation of a given game phase to an action vector.
///
/// Implementations may keep internal state between calls (for example recurrent
/// networks), which is why evaluation takes `&mut self`. A session reuses one policy
/// instance for every episode of a batch.
pub trait Policy {
    fn evaluate(&mut self, state: &[f64], phase: usize) -> Result<Vec<f64>, PolicyError>;
}

impl<P> Policy for &mut P
where
    P: Policy + ?Sized,
{
    fn evaluate(&mut self, state: &[f64], phase: usize) -> Result<Vec<f64>, PolicyError> {
        (**self).evaluate(state, phase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum PolicyError {
    #[display("engine reported phase {phase} but the policy has {phases} phase(s)")]
    UnknownPhase { phase: usize, phases: usize },
    #[display("phase {phase} expects {expected} inputs, engine sent {found}")]
    InputSize {
        phase: usize,
        expected: usize,
        found: usize,
    },
}
