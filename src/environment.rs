//! Scope chain of name bindings.
//!
//! An [`Environment`] is an ordered chain of frames, root first. Lookups walk the chain
//! from the innermost frame outwards and the first match wins; stores always target the
//! innermost frame. The root frame is never removed.
//!
//! Frames are shared by reference: [`Environment::fork`] produces a second chain that
//! sees (and writes through to) the same frames up to the fork point. User-defined
//! methods hold a [`CapturedScope`] of their defining chain, which keeps those frames
//! alive after their scope has been popped.
//!
//! A method stored in a frame it closes over forms a reference cycle. Every frame is
//! registered with the environment built by [`Environment::new`], and dropping that
//! environment empties all of them, which breaks such cycles. Methods that outlive it
//! see no bindings.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};

use crate::ast::Value;
use crate::method::Method;

/// One level of name bindings
#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Value>,
}

type FrameRef = Rc<RefCell<Frame>>;

/// Every frame created on behalf of one root environment
#[derive(Debug, Default)]
struct FrameRegistry {
    frames: RefCell<Vec<Weak<RefCell<Frame>>>>,
}

impl FrameRegistry {
    fn create(&self) -> FrameRef {
        let frame = FrameRef::default();
        let mut frames = self.frames.borrow_mut();
        if frames.len() == frames.capacity() {
            frames.retain(|frame| frame.strong_count() > 0);
        }
        frames.push(Rc::downgrade(&frame));
        frame
    }

    /// Empty every frame that is still alive
    fn release_all(&self) {
        let live: Vec<FrameRef> = self
            .frames
            .borrow_mut()
            .drain(..)
            .filter_map(|frame| frame.upgrade())
            .collect();
        for frame in live {
            // Dropped outside the borrow: values may own other frames
            let bindings = std::mem::take(&mut frame.borrow_mut().bindings);
            drop(bindings);
        }
    }
}

/// Environment for variable and method bindings
#[derive(Debug)]
pub struct Environment {
    // Invariant: never empty; frames[0] is the root
    frames: Vec<FrameRef>,
    registry: Rc<FrameRegistry>,
    // Set only for the environment built by `new`
    owner: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Create an environment holding only an empty root frame
    pub fn new() -> Self {
        let registry = Rc::new(FrameRegistry::default());
        Environment {
            frames: vec![registry.create()],
            registry,
            owner: true,
        }
    }

    /// Bind `name` in the innermost frame, replacing any binding of the same name there
    pub fn store_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.innermost()
            .borrow_mut()
            .bindings
            .insert(name.into(), value.into());
    }

    /// Register a method under its own name in the innermost frame
    pub fn add_method(&mut self, method: Method) {
        let name = method.name().to_owned();
        self.store_value(name, Value::Method(Rc::new(method)));
    }

    /// Find the innermost binding of `name`
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.borrow().bindings.get(name).cloned())
    }

    /// Find the innermost binding of `name` if it holds a method.
    ///
    /// A non-method binding shadows any method of the same name further out.
    pub fn lookup_method(&self, name: &str) -> Option<Rc<Method>> {
        match self.lookup(name)? {
            Value::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Run `body` with a fresh child frame as the innermost scope.
    ///
    /// The frame is popped when `body` returns, whether it succeeded, failed, or
    /// panicked, so scopes nest correctly under recursive use.
    pub fn scoped<R>(&mut self, body: impl FnOnce(&mut Environment) -> R) -> R {
        let mut guard = ScopeGuard::enter(self);
        body(&mut *guard)
    }

    /// A new environment sharing this chain's frames by reference.
    ///
    /// The fork does not own the shared frames; they are emptied when the environment
    /// created by [`Environment::new`] is dropped.
    pub fn fork(&self) -> Environment {
        Environment {
            frames: self.frames.clone(),
            registry: Rc::clone(&self.registry),
            owner: false,
        }
    }

    /// Number of frames in the chain, root included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Get all visible bindings, innermost winning, sorted by name
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let mut visible = HashMap::new();

        // Outermost first so inner frames override
        for frame in &self.frames {
            for (name, value) in &frame.borrow().bindings {
                visible.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    pub(crate) fn capture(&self) -> CapturedScope {
        CapturedScope {
            frames: self.frames.clone(),
            registry: Rc::clone(&self.registry),
        }
    }

    fn innermost(&self) -> &FrameRef {
        // The chain is never empty
        &self.frames[self.frames.len() - 1]
    }

    fn push_frame(&mut self) {
        let frame = self.registry.create();
        self.frames.push(frame);
    }

    fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }
}

/// Pops every frame pushed since it was created when dropped
struct ScopeGuard<'a> {
    env: &'a mut Environment,
    depth: usize,
}

impl<'a> ScopeGuard<'a> {
    fn enter(env: &'a mut Environment) -> Self {
        let depth = env.depth();
        env.push_frame();
        ScopeGuard { env, depth }
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Environment {
        self.env
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.env.truncate(self.depth);
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.owner {
            self.registry.release_all();
        }
    }
}

/// The frame chain a user-defined method was defined in
#[derive(Debug, Clone)]
pub(crate) struct CapturedScope {
    frames: Vec<FrameRef>,
    registry: Rc<FrameRegistry>,
}

impl CapturedScope {
    /// A non-owning environment over the captured frames
    pub(crate) fn restore(&self) -> Environment {
        Environment {
            frames: self.frames.clone(),
            registry: Rc::clone(&self.registry),
            owner: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::lit;

    fn num(n: i64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_store_and_lookup() {
        let mut env = Environment::new();
        assert_eq!(env.lookup("$a"), None);

        env.store_value("$a", 5);
        env.store_value("$b", 90);
        assert_eq!(env.lookup("$a"), Some(num(5)));
        assert_eq!(env.lookup("$b"), Some(num(90)));

        // Same frame, same name: overwrite
        env.store_value("$a", 6);
        assert_eq!(env.lookup("$a"), Some(num(6)));
    }

    #[test]
    fn test_shadowing_is_scoped() {
        let mut env = Environment::new();
        env.store_value("x", 1);

        env.scoped(|inner| {
            assert_eq!(inner.depth(), 2);
            assert_eq!(inner.lookup("x"), Some(num(1)));
            inner.store_value("x", 2);
            inner.store_value("y", 3);
            assert_eq!(inner.lookup("x"), Some(num(2)));
        });

        assert_eq!(env.depth(), 1);
        assert_eq!(env.lookup("x"), Some(num(1)));
        assert_eq!(env.lookup("y"), None);
    }

    #[test]
    fn test_scoped_pops_on_failure_and_nests() {
        let mut env = Environment::new();

        let result: Result<(), &str> = env.scoped(|outer| {
            outer.store_value("a", 1);
            outer.scoped(|inner| {
                assert_eq!(inner.depth(), 3);
                inner.store_value("b", 2);
                Err("inner failure")
            })
        });

        assert_eq!(result, Err("inner failure"));
        assert_eq!(env.depth(), 1);
        assert_eq!(env.lookup("a"), None);
        assert_eq!(env.lookup("b"), None);
    }

    #[test]
    fn test_scoped_pops_on_panic() {
        let mut env = Environment::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            env.scoped(|inner| {
                inner.store_value("doomed", true);
                panic!("boom");
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(env.depth(), 1);
        assert_eq!(env.lookup("doomed"), None);
    }

    #[test]
    fn test_fork_shares_frames() {
        let mut env = Environment::new();
        env.store_value("shared", 1);

        let mut fork = env.fork();
        fork.store_value("from-fork", 2);
        assert_eq!(env.lookup("from-fork"), Some(num(2)));

        // Frames pushed on the fork are its own
        fork.scoped(|inner| {
            inner.store_value("private", 3);
            assert_eq!(inner.lookup("shared"), Some(num(1)));
        });
        assert_eq!(env.lookup("private"), None);
    }

    #[test]
    fn test_bindings_innermost_wins() {
        let mut env = Environment::new();
        env.store_value("b", 1);
        env.store_value("a", 1);
        env.scoped(|inner| {
            inner.store_value("b", 2);
            let names: Vec<_> = inner.bindings();
            assert_eq!(
                names,
                vec![("a".to_owned(), num(1)), ("b".to_owned(), num(2))]
            );
        });
    }

    #[test]
    fn test_captured_scope_outlives_its_scope() {
        let mut env = Environment::new();
        env.store_value("shared", 1);

        let captured = env.scoped(|inner| {
            inner.store_value("local", 2);
            inner.capture()
        });
        assert_eq!(env.depth(), 1);
        assert_eq!(env.lookup("local"), None);

        let restored = captured.restore();
        assert_eq!(restored.depth(), 2);
        assert_eq!(restored.lookup("local"), Some(num(2)));

        // Still the live root, not a copy
        env.store_value("shared", 3);
        assert_eq!(restored.lookup("shared"), Some(num(3)));

        // Dropping a non-owning chain releases nothing
        drop(restored);
        drop(env.fork());
        assert_eq!(captured.restore().lookup("local"), Some(num(2)));
    }

    #[test]
    fn test_owner_drop_breaks_method_cycles() {
        let mut env = Environment::new();
        let root = Rc::downgrade(&env.frames[0]);
        let inner_frame = env.scoped(|inner| {
            // Stored in the frame it captures
            let method = Method::defined("m", vec![], Rc::new(lit(1)), inner);
            inner.add_method(method);
            Rc::downgrade(inner.innermost())
        });
        let method = Method::defined("top", vec![], Rc::new(lit(2)), &env);
        env.add_method(method);

        assert!(inner_frame.upgrade().is_some());
        let captured = env.capture();
        drop(env);

        assert!(inner_frame.upgrade().is_none());
        assert_eq!(captured.restore().lookup("top"), None);
        drop(captured);
        assert!(root.upgrade().is_none());
    }
}
