/// A container's classification under the growth-efficiency algorithm.
///
/// `watching` and `completing` are never both true, so this is one enum
/// rather than two independent booleans: the invariant is structural
/// instead of something every call site has to remember to preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassificationState {
    #[default]
    Active,
    Watching,
    Completing,
}

impl ClassificationState {
    pub fn is_watching(self) -> bool {
        matches!(self, ClassificationState::Watching)
    }

    pub fn is_completing(self) -> bool {
        matches!(self, ClassificationState::Completing)
    }
}
