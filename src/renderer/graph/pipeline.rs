//! Render Pass Pipeline
//!
//! `RenderPassPipeline` owns the ordered list of passes and drives their
//! lifecycle. Registration order is execution order: nothing is reordered,
//! and a pass that reads another pass's attachment must be registered after
//! it. Passes may declare those edges through
//! [`RenderPass::dependencies`]; `init_late_all` rejects a pipeline whose
//! declared edges point at a missing or later pass before any hook runs.
//!
//! # Lookups
//!
//! Hooks that run after `init` receive a [`PassLookup`] over every *other*
//! pass. It resolves by type (an index through a `TypeId` map, then a
//! downcast) or by name. Lookups are resolved on every call and must not be
//! held across frames: a consumer that derives GPU state from a producer's
//! attachment keys it by the attachment's `Tracked` id instead.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;

use super::pass::{PassBackend, PassOutput, PassState, RenderPass};
use crate::errors::{Result, TesseraError};

/// A registered pass plus its bookkeeping.
pub struct PassEntry<B: PassBackend> {
    pass: Box<dyn RenderPass<B>>,
    name: &'static str,
    state: PassState,
}

impl<B: PassBackend> PassEntry<B> {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> PassState {
        self.state
    }
}

/// Read-only view of the registered passes, excluding the one being driven.
pub struct PassLookup<'a, B: PassBackend> {
    before: &'a [PassEntry<B>],
    after: &'a [PassEntry<B>],
    current: Option<usize>,
    by_name: &'a FxHashMap<&'static str, usize>,
    by_type: &'a FxHashMap<TypeId, usize>,
}

impl<'a, B: PassBackend> PassLookup<'a, B> {
    fn entry(&self, index: usize) -> Option<&'a PassEntry<B>> {
        match self.current {
            Some(current) if index == current => None,
            Some(current) if index > current => self.after.get(index - current - 1),
            _ => self.before.get(index),
        }
    }

    fn entry_of<P: RenderPass<B>>(&self) -> Option<&'a PassEntry<B>> {
        let index = *self.by_type.get(&TypeId::of::<P>())?;
        self.entry(index)
    }

    /// Name of the pass registered under `type_id` if it is not `Ready`.
    fn not_ready(&self, type_id: TypeId) -> Option<&'static str> {
        let entry = self.entry(*self.by_type.get(&type_id)?)?;
        (entry.state != PassState::Ready).then_some(entry.name)
    }

    /// The registered pass of type `P`.
    #[must_use]
    pub fn get<P: RenderPass<B>>(&self) -> Option<&'a P> {
        let pass: &dyn Any = &*self.entry_of::<P>()?.pass;
        pass.downcast_ref::<P>()
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&'a dyn RenderPass<B>> {
        let index = *self.by_name.get(name)?;
        self.entry(index).map(|entry| &*entry.pass)
    }

    /// Output of producer `P`.
    ///
    /// Reading a producer that has not completed `init_late` (or
    /// `resize_late`) is a programmer error: it asserts in debug builds and
    /// yields `None` in release builds.
    #[must_use]
    pub fn output<P: RenderPass<B> + PassOutput>(&self) -> Option<&'a P::Output> {
        let entry = self.entry_of::<P>()?;
        debug_assert!(
            entry.state == PassState::Ready,
            "pass output of '{}' read in state {:?}",
            entry.name,
            entry.state
        );
        if entry.state != PassState::Ready {
            log::warn!("Pass output of '{}' read in state {:?}", entry.name, entry.state);
            return None;
        }
        let pass: &dyn Any = &*entry.pass;
        pass.downcast_ref::<P>()?.output()
    }
}

/// Ordered collection of render passes.
pub struct RenderPassPipeline<B: PassBackend> {
    entries: Vec<PassEntry<B>>,
    by_name: FxHashMap<&'static str, usize>,
    by_type: FxHashMap<TypeId, usize>,
}

impl<B: PassBackend> Default for RenderPassPipeline<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PassBackend> RenderPassPipeline<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: FxHashMap::default(),
            by_type: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pass names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<PassState> {
        self.by_name.get(name).map(|&index| self.entries[index].state)
    }

    /// Registers `pass` at the end of the pipeline and runs its `init`.
    ///
    /// A pass whose `init` fails is shut down and not registered.
    pub fn add_pass<P: RenderPass<B>>(&mut self, mut pass: P, ctx: &mut B::Init<'_>) -> Result<usize> {
        let name = pass.name();
        if self.by_name.contains_key(name) || self.by_type.contains_key(&TypeId::of::<P>()) {
            return Err(TesseraError::DuplicatePass(name.to_string()));
        }

        if let Err(e) = pass.init(ctx) {
            log::error!("Render pass '{name}' failed to initialize: {e}");
            pass.shutdown();
            return Err(e);
        }

        let index = self.entries.len();
        self.entries.push(PassEntry {
            pass: Box::new(pass),
            name,
            state: PassState::Initialized,
        });
        self.by_name.insert(name, index);
        self.by_type.insert(TypeId::of::<P>(), index);
        log::debug!("Registered render pass '{name}' at position {index}");
        Ok(index)
    }

    /// Checks every declared dependency against registration order.
    pub fn validate_dependencies(&self) -> Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            for dependency in entry.pass.dependencies() {
                match self.by_type.get(&dependency.type_id) {
                    None => {
                        return Err(TesseraError::MissingDependency {
                            consumer: entry.name.to_string(),
                            producer: dependency.type_name.to_string(),
                        });
                    }
                    Some(&producer) if producer >= index => {
                        return Err(TesseraError::PassOrderViolation {
                            consumer: entry.name.to_string(),
                            producer: self.entries[producer].name.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Runs `init_late` on every initialized pass, in registration order.
    pub fn init_late_all(&mut self, ctx: &mut B::Init<'_>) -> Result<()> {
        self.validate_dependencies()?;
        self.for_each_with_lookup(|entry, passes| {
            if entry.state != PassState::Initialized {
                return Ok(());
            }
            entry.pass.init_late(ctx, passes).inspect_err(|e| {
                log::error!("Render pass '{}' init_late failed: {e}", entry.name);
            })?;
            entry.state = PassState::Ready;
            Ok(())
        })
    }

    /// Runs `update` on every ready pass, in registration order.
    pub fn update_all(&mut self, ctx: &mut B::Frame<'_>) -> Result<()> {
        self.for_each_with_lookup(|entry, passes| {
            if entry.state != PassState::Ready {
                log::debug!("Skipping render pass '{}' in state {:?}", entry.name, entry.state);
                return Ok(());
            }
            B::push_debug_group(ctx, entry.name);
            let result = entry.pass.update(ctx, passes);
            B::pop_debug_group(ctx);
            result.inspect_err(|e| log::error!("Render pass '{}' update failed: {e}", entry.name))
        })
    }

    /// Resizes every live pass.
    ///
    /// Every pass is visited even when an earlier one fails. A pass whose
    /// resize fails drops back to `Registered` and is skipped until a later
    /// resize succeeds; the first error is returned after the loop so the
    /// caller can still run [`resize_late_all`](Self::resize_late_all) for
    /// the passes that did resize.
    pub fn resize_all(&mut self, ctx: &mut B::Init<'_>, width: u32, height: u32) -> Result<()> {
        let mut first_error = None;
        for entry in &mut self.entries {
            if entry.state == PassState::ShutDown {
                continue;
            }
            match entry.pass.resize(ctx, width, height) {
                Ok(()) => entry.state = PassState::Initialized,
                Err(e) => {
                    log::error!("Render pass '{}' failed to resize to {width}x{height}: {e}", entry.name);
                    entry.state = PassState::Registered;
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Runs `resize_late` on every resized pass, in registration order.
    ///
    /// A pass whose declared producer is not `Ready` (it failed to resize,
    /// or was itself parked) is parked as `Registered` without running its
    /// hook. Failures park the failing pass; the first error is returned
    /// once every pass has been visited.
    pub fn resize_late_all(&mut self, ctx: &mut B::Init<'_>) -> Result<()> {
        let mut first_error = None;
        self.for_each_with_lookup(|entry, passes| {
            if entry.state != PassState::Initialized {
                return Ok(());
            }
            if let Some(producer) = entry
                .pass
                .dependencies()
                .into_iter()
                .find_map(|dependency| passes.not_ready(dependency.type_id))
            {
                log::warn!(
                    "Render pass '{}' parked: producer '{producer}' is not ready after resize",
                    entry.name
                );
                entry.state = PassState::Registered;
                return Ok(());
            }
            match entry.pass.resize_late(ctx, passes) {
                Ok(()) => entry.state = PassState::Ready,
                Err(e) => {
                    log::error!("Render pass '{}' resize_late failed: {e}", entry.name);
                    entry.state = PassState::Registered;
                    first_error.get_or_insert(e);
                }
            }
            Ok(())
        })?;
        first_error.map_or(Ok(()), Err)
    }

    /// Shuts every pass down in reverse registration order. Idempotent.
    pub fn shutdown_all(&mut self) {
        for entry in self.entries.iter_mut().rev() {
            if entry.state == PassState::ShutDown {
                continue;
            }
            entry.pass.shutdown();
            entry.state = PassState::ShutDown;
            log::debug!("Render pass '{}' shut down", entry.name);
        }
    }

    /// Lookup over every registered pass.
    #[must_use]
    pub fn lookup(&self) -> PassLookup<'_, B> {
        PassLookup {
            before: &self.entries,
            after: &[],
            current: None,
            by_name: &self.by_name,
            by_type: &self.by_type,
        }
    }

    #[must_use]
    pub fn get_pass<P: RenderPass<B>>(&self) -> Option<&P> {
        self.lookup().get::<P>()
    }

    #[must_use]
    pub fn get_pass_mut<P: RenderPass<B>>(&mut self) -> Option<&mut P> {
        let index = *self.by_type.get(&TypeId::of::<P>())?;
        let pass: &mut dyn Any = &mut *self.entries[index].pass;
        pass.downcast_mut::<P>()
    }

    #[must_use]
    pub fn get_pass_output<P: RenderPass<B> + PassOutput>(&self) -> Option<&P::Output> {
        self.lookup().output::<P>()
    }

    #[must_use]
    pub fn get_pass_by_name(&self, name: &str) -> Option<&dyn RenderPass<B>> {
        self.lookup().get_by_name(name)
    }

    /// Calls `f` for each pass in order with a lookup over all other passes.
    fn for_each_with_lookup<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut PassEntry<B>, &PassLookup<'_, B>) -> Result<()>,
    {
        let Self {
            entries,
            by_name,
            by_type,
        } = self;

        for index in 0..entries.len() {
            let (before, rest) = entries.split_at_mut(index);
            let Some((current, after)) = rest.split_first_mut() else {
                break;
            };
            let passes = PassLookup {
                before,
                after,
                current: Some(index),
                by_name,
                by_type,
            };
            f(current, &passes)?;
        }
        Ok(())
    }
}
