use crate::resources::Remote;

pub trait AndIf<F> {
    fn and_if(self, condition: bool, then: F) -> Self;
}

pub trait AndIfSome<F, FC> {
    fn and_if_some(self, closure: FC, then: F) -> Self;
}

impl<T, F> AndIf<F> for T
where
    F: FnOnce(Self) -> Self,
{
    fn and_if(self, condition: bool, then: F) -> Self {
        if condition {
            then(self)
        } else {
            self
        }
    }
}

impl<T, TC, F, FC> AndIfSome<F, FC> for T
where
    F: FnOnce(Self, TC) -> Self,
    FC: FnOnce() -> Option<TC>,
{
    fn and_if_some(self, closure: FC, then: F) -> Self {
        match closure() {
            Some(result) => then(self, result),
            None => self,
        }
    }
}

/// Access to the properties of a partially populated provider view.
pub trait RequireProperties<P, E> {
    fn require_properties_or_else(&self, error: impl FnOnce() -> E) -> Result<&P, E>;
}

impl<P, E> RequireProperties<P, E> for Remote<P> {
    fn require_properties_or_else(&self, error: impl FnOnce() -> E) -> Result<&P, E> {
        self.properties.as_ref().ok_or_else(error)
    }
}
