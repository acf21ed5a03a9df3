//! Reducers: pure state transitions scoped to one feature.
//!
//! A reducer declares which actions it handles ([`Reducer::should_reduce`])
//! and how it turns the current state into the next one ([`Reducer::reduce`]).
//! Matching is a method on the reducer, so a feature never inspects the
//! runtime type of an action: applications match on their own action enum.
//!
//! # Examples
//!
//! ## Implementing the trait
//!
//! ```
//! use statehouse_core::Reducer;
//!
//! #[derive(Clone, Debug)]
//! enum TodoAction {
//!     Add(String),
//!     Clear,
//! }
//!
//! struct AddTodo;
//!
//! impl Reducer for AddTodo {
//!     type State = Vec<String>;
//!     type Action = TodoAction;
//!
//!     fn should_reduce(&self, action: &TodoAction) -> bool {
//!         matches!(action, TodoAction::Add(_))
//!     }
//!
//!     fn reduce(&self, state: &Vec<String>, action: &TodoAction) -> Vec<String> {
//!         let mut next = state.clone();
//!         if let TodoAction::Add(title) = action {
//!             next.push(title.clone());
//!         }
//!         next
//!     }
//! }
//!
//! let next = AddTodo.reduce(&vec![], &TodoAction::Add("milk".into()));
//! assert_eq!(next, vec!["milk".to_string()]);
//! ```
//!
//! ## Closure reducers
//!
//! ```
//! use statehouse_core::reducer::{on, Reducer};
//!
//! let double = on(|n: &i32| *n > 0, |state: &i32, n: &i32| state * n);
//! assert!(double.should_reduce(&2));
//! assert_eq!(double.reduce(&3, &2), 6);
//! ```

use std::fmt;
use std::marker::PhantomData;

/// The Reducer trait - a pure transition for one feature's state
///
/// # Type Parameters
///
/// - `State`: The feature state this reducer produces
/// - `Action`: The application action type
///
/// Implementations must not mutate shared data: every call returns a freshly
/// built state value.
pub trait Reducer: Send + Sync {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer matches against
    type Action;

    /// Whether this reducer handles the given action
    fn should_reduce(&self, action: &Self::Action) -> bool;

    /// Produce the next state from the current one
    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Self::State;
}

/// A reducer built from a predicate closure and a transition closure.
///
/// Created with [`on`].
pub struct ReducerFn<S, A, P, F> {
    predicate: P,
    transition: F,
    _marker: PhantomData<fn(&S, &A) -> S>,
}

impl<S, A, P, F> Reducer for ReducerFn<S, A, P, F>
where
    P: Fn(&A) -> bool + Send + Sync,
    F: Fn(&S, &A) -> S + Send + Sync,
{
    type State = S;
    type Action = A;

    fn should_reduce(&self, action: &A) -> bool {
        (self.predicate)(action)
    }

    fn reduce(&self, state: &S, action: &A) -> S {
        (self.transition)(state, action)
    }
}

impl<S, A, P, F> fmt::Debug for ReducerFn<S, A, P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerFn").finish_non_exhaustive()
    }
}

/// Build a reducer that applies `transition` to actions accepted by `predicate`.
///
/// # Example
///
/// ```
/// use statehouse_core::reducer::{on, Reducer};
///
/// #[derive(Clone, Debug)]
/// enum Action { Increment, Decrement }
///
/// let increment = on(
///     |a: &Action| matches!(a, Action::Increment),
///     |count: &u32, _: &Action| count + 1,
/// );
///
/// assert!(increment.should_reduce(&Action::Increment));
/// assert!(!increment.should_reduce(&Action::Decrement));
/// ```
pub const fn on<S, A, P, F>(predicate: P, transition: F) -> ReducerFn<S, A, P, F>
where
    P: Fn(&A) -> bool + Send + Sync,
    F: Fn(&S, &A) -> S + Send + Sync,
{
    ReducerFn {
        predicate,
        transition,
        _marker: PhantomData,
    }
}
