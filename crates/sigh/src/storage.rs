use std::sync::{Arc, Mutex};

use ahash::AHashMap;

use crate::{
    ast::Ast,
    scopes::{ScopeId, ScopeKind, Scopes},
    value::{lock, Value},
};

/// One runtime frame: per-name slots for a scope, linked to the frame it was
/// pushed on top of.
///
/// Frames form per-thread chains (blocks and calls push, exits pop); the
/// root frame sits at the bottom of every chain and is shared between
/// threads, which is why slots live behind a lock.
#[derive(Debug, Clone)]
pub(crate) struct Frame(Arc<FrameData>);

#[derive(Debug)]
struct FrameData {
    scope: ScopeId,
    slots: Mutex<AHashMap<String, Value>>,
    parent: Option<Frame>,
}

impl Frame {
    pub fn new(scope: ScopeId, parent: Option<Frame>) -> Self {
        Self(Arc::new(FrameData {
            scope,
            slots: Mutex::new(AHashMap::new()),
            parent,
        }))
    }

    pub fn scope(&self) -> ScopeId {
        self.0.scope
    }

    pub fn parent(&self) -> Option<&Frame> {
        self.0.parent.as_ref()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        lock(&self.0.slots).insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.0.slots).get(name).cloned()
    }

    /// Snapshot of every slot, for the instance-refresh protocol.
    pub fn entries(&self) -> Vec<(String, Value)> {
        lock(&self.0.slots)
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Finds the innermost frame along this chain that holds `target`.
    ///
    /// A frame matches when its scope is `target` itself, or when `target`
    /// is a class scope and the frame belongs to a subclass of it: inherited
    /// method bodies resolve their references in ancestor class scopes, but
    /// at run time the live frame is the instance's own class frame.
    pub fn resolve(&self, target: ScopeId, ast: &Ast, scopes: &Scopes) -> Option<Frame> {
        let target_data = scopes.get(target);
        let mut current = Some(self);
        while let Some(frame) = current {
            if frame.scope() == target {
                return Some(frame.clone());
            }
            if target_data.kind == ScopeKind::Class {
                let frame_data = scopes.get(frame.scope());
                if frame_data.kind == ScopeKind::Class
                    && scopes.class_inherits(ast, frame_data.node, target_data.node)
                {
                    return Some(frame.clone());
                }
            }
            current = frame.parent();
        }
        None
    }

    /// The innermost class-scope frame starting at this frame, if any.
    pub fn innermost_class_frame(&self, scopes: &Scopes) -> Option<Frame> {
        let mut current = Some(self);
        while let Some(frame) = current {
            if scopes.get(frame.scope()).kind == ScopeKind::Class {
                return Some(frame.clone());
            }
            current = frame.parent();
        }
        None
    }
}
