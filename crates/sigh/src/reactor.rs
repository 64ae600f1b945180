use std::{collections::VecDeque, sync::Arc};

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use strum::Display;

use crate::{
    ast::{Ast, NodeId},
    errors::SemanticError,
    scopes::{ScopeId, Scopes},
    types::{FieldMap, Type},
};

/// Names of the attribute slots the analyzer decorates nodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, serde::Serialize)]
pub enum Attr {
    /// Type of an expression or of the value a declaration denotes.
    Type,
    /// The type denoted by a type expression.
    Value,
    /// Scope introduced by a scope-bearing node, or the scope a reference's
    /// declaration lives in.
    Scope,
    /// Resolved declaration of a reference.
    Decl,
    /// Whether execution through this statement unconditionally returns.
    Returns,
    /// Overridden parent method of a method declaration (or deliberately
    /// `Void` when there is none).
    Parent,
    /// Thread index the node executes under (0 = main thread).
    ThreadIndex,
    /// The type being declared by a struct or class declaration.
    Declared,
    /// Ancestor chain of a class declaration, self first.
    Ancestors,
    /// Positional index of a call argument, for empty-array inference.
    ArgIndex,
    /// Member map of a class declaration (fields, methods, constructor).
    Fields,
}

/// A published attribute value.
#[derive(Debug, Clone)]
pub enum AttrValue {
    Type(Type),
    Scope(ScopeId),
    Node(NodeId),
    Bool(bool),
    Index(usize),
    Thread(u64),
    Nodes(Vec<NodeId>),
    Fields(Arc<FieldMap>),
    /// Deliberate absence (a method with no overridden parent).
    Void,
}

impl AttrValue {
    /// # Panics
    /// Panics when the value is not a `Type`; rule inputs are declared, so a
    /// mismatch is an analyzer bug.
    #[must_use]
    pub fn as_type(&self) -> &Type {
        match self {
            Self::Type(ty) => ty,
            other => panic!("attribute holds {other:?}, expected a type"),
        }
    }

    #[must_use]
    pub fn as_scope(&self) -> ScopeId {
        match self {
            Self::Scope(id) => *id,
            other => panic!("attribute holds {other:?}, expected a scope"),
        }
    }

    #[must_use]
    pub fn as_node(&self) -> NodeId {
        match self {
            Self::Node(id) => *id,
            other => panic!("attribute holds {other:?}, expected a node"),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            other => panic!("attribute holds {other:?}, expected a bool"),
        }
    }

    #[must_use]
    pub fn as_thread(&self) -> u64 {
        match self {
            Self::Thread(index) => *index,
            other => panic!("attribute holds {other:?}, expected a thread index"),
        }
    }

    #[must_use]
    pub fn as_nodes(&self) -> &[NodeId] {
        match self {
            Self::Nodes(nodes) => nodes,
            other => panic!("attribute holds {other:?}, expected a node list"),
        }
    }

    #[must_use]
    pub fn as_fields(&self) -> &Arc<FieldMap> {
        match self {
            Self::Fields(fields) => fields,
            other => panic!("attribute holds {other:?}, expected a field map"),
        }
    }
}

/// Attribute key: a slot on a node.
pub type Slot = (NodeId, Attr);

type RuleFn = Box<dyn FnOnce(&mut RuleCx<'_>)>;

struct RuleSlot {
    inputs: SmallVec<[Slot; 4]>,
    outputs: SmallVec<[Slot; 2]>,
    missing: usize,
    cancelled: bool,
    action: Option<RuleFn>,
}

/// The dataflow store driving semantic analysis.
///
/// Attributes are values in `(node, attr)` slots. Rules declare the slots
/// they read and the slots they intend to write; a rule fires exactly once,
/// as soon as every input is available. `error_for` marks output slots as
/// deliberately unproduced, which cancels (rather than deadlocks) every
/// dependent rule, so the error set stays complete.
pub(crate) struct Reactor {
    values: AHashMap<Slot, AttrValue>,
    suppressed: AHashSet<Slot>,
    rules: Vec<RuleSlot>,
    waiting: AHashMap<Slot, Vec<usize>>,
    ready: VecDeque<usize>,
    errors: Vec<SemanticError>,
}

/// What a firing rule sees: the store plus the read-only analysis world.
///
/// Rule closures capture only `Copy` ids; everything else arrives through
/// this context, which keeps them free of lifetime entanglements.
pub(crate) struct RuleCx<'a> {
    pub reactor: &'a mut Reactor,
    pub ast: &'a Ast,
    pub scopes: &'a Scopes,
}

impl<'a> RuleCx<'a> {
    /// Reads a previously published attribute.
    ///
    /// # Panics
    /// Panics when the slot was never set; declared inputs are always
    /// present when a rule fires.
    #[must_use]
    pub fn get(&self, node: NodeId, attr: Attr) -> AttrValue {
        self.reactor.get(node, attr)
    }

    pub fn set(&mut self, node: NodeId, attr: Attr, value: AttrValue) {
        self.reactor.set(node, attr, value);
    }

    pub fn error(&mut self, msg: impl Into<String>, node: NodeId) {
        let range = self.ast.range(node);
        self.reactor.report(SemanticError {
            msg: msg.into(),
            node,
            attr: None,
            range,
        });
    }

    /// Reports an error and marks the given slots as deliberately absent.
    pub fn error_for(&mut self, msg: impl Into<String>, node: NodeId, slots: impl IntoIterator<Item = Slot>) {
        let range = self.ast.range(node);
        let mut slots = slots.into_iter();
        let first = slots.next();
        self.reactor.report(SemanticError {
            msg: msg.into(),
            node,
            attr: first.map(|(_, attr)| attr),
            range,
        });
        if let Some(slot) = first {
            self.reactor.suppress(slot);
        }
        for slot in slots {
            self.reactor.suppress(slot);
        }
    }

    /// Registers a follow-up rule from inside a firing rule.
    pub fn rule(&mut self, outputs: impl IntoIterator<Item = Slot>) -> RuleBuilder<'_> {
        self.reactor.rule(outputs)
    }
}

impl Reactor {
    pub fn new() -> Self {
        Self {
            values: AHashMap::new(),
            suppressed: AHashSet::new(),
            rules: Vec::new(),
            waiting: AHashMap::new(),
            ready: VecDeque::new(),
            errors: Vec::new(),
        }
    }

    /// Publishes an attribute value and schedules rules it unblocks.
    pub fn set(&mut self, node: NodeId, attr: Attr, value: AttrValue) {
        let slot = (node, attr);
        let fresh = self.values.insert(slot, value).is_none();
        if !fresh {
            return;
        }
        if let Some(indices) = self.waiting.remove(&slot) {
            for index in indices {
                let rule = &mut self.rules[index];
                if rule.cancelled {
                    continue;
                }
                rule.missing -= 1;
                if rule.missing == 0 {
                    self.ready.push_back(index);
                }
            }
        }
    }

    /// # Panics
    /// Panics when the slot was never set.
    #[must_use]
    pub fn get(&self, node: NodeId, attr: Attr) -> AttrValue {
        self.values
            .get(&(node, attr))
            .unwrap_or_else(|| panic!("attribute {attr} of node {node} was never set"))
            .clone()
    }

    #[must_use]
    pub fn maybe(&self, node: NodeId, attr: Attr) -> Option<&AttrValue> {
        self.values.get(&(node, attr))
    }

    pub fn report(&mut self, error: SemanticError) {
        self.errors.push(error);
    }

    /// Marks a slot as deliberately unproduced and cancels dependents.
    pub fn suppress(&mut self, slot: Slot) {
        let mut work = vec![slot];
        while let Some(slot) = work.pop() {
            if self.values.contains_key(&slot) || !self.suppressed.insert(slot) {
                continue;
            }
            if let Some(indices) = self.waiting.remove(&slot) {
                for index in indices {
                    let rule = &mut self.rules[index];
                    if rule.cancelled {
                        continue;
                    }
                    rule.cancelled = true;
                    rule.action = None;
                    work.extend(rule.outputs.iter().copied());
                }
            }
        }
    }

    /// Starts registering a rule that intends to write `outputs`.
    pub fn rule(&mut self, outputs: impl IntoIterator<Item = Slot>) -> RuleBuilder<'_> {
        RuleBuilder {
            reactor: self,
            outputs: outputs.into_iter().collect(),
            inputs: SmallVec::new(),
        }
    }

    fn register(&mut self, outputs: SmallVec<[Slot; 2]>, inputs: SmallVec<[Slot; 4]>, action: RuleFn) {
        // a rule depending on a suppressed slot is dead on arrival; its own
        // outputs become deliberately absent too
        if inputs.iter().any(|slot| self.suppressed.contains(slot)) {
            for slot in outputs {
                self.suppress(slot);
            }
            return;
        }
        let index = self.rules.len();
        let missing = inputs.iter().filter(|slot| !self.values.contains_key(*slot)).count();
        for slot in &inputs {
            if !self.values.contains_key(slot) {
                self.waiting.entry(*slot).or_default().push(index);
            }
        }
        self.rules.push(RuleSlot {
            inputs,
            outputs,
            missing,
            cancelled: false,
            action: Some(action),
        });
        if self.rules[index].missing == 0 {
            self.ready.push_back(index);
        }
    }

    /// Drains the ready queue to fixpoint.
    ///
    /// Rules left unfired afterwards were waiting on slots nothing ever
    /// produced; the rules responsible for those slots have already reported
    /// why (unresolved references, suppressed inference), so silence here is
    /// intentional.
    pub fn run(&mut self, ast: &Ast, scopes: &Scopes) {
        while let Some(index) = self.ready.pop_front() {
            if self.rules[index].cancelled {
                continue;
            }
            let Some(action) = self.rules[index].action.take() else {
                continue;
            };
            debug_assert_eq!(self.rules[index].missing, 0);
            let mut cx = RuleCx {
                reactor: self,
                ast,
                scopes,
            };
            action(&mut cx);
        }
    }

    /// Outputs of rules that never fired after a full drain.
    ///
    /// Their inputs were neither produced nor suppressed, which only
    /// happens when a definition transitively depends on itself.
    pub fn stalled(&self) -> Vec<Slot> {
        self.rules
            .iter()
            .filter(|rule| !rule.cancelled && rule.action.is_some())
            .flat_map(|rule| rule.outputs.iter().copied())
            .filter(|slot| !self.values.contains_key(slot) && !self.suppressed.contains(slot))
            .collect()
    }

    /// Consumes the reactor, yielding the attribute store and the errors.
    pub fn finish(self) -> (AHashMap<Slot, AttrValue>, Vec<SemanticError>) {
        (self.values, self.errors)
    }

    #[cfg(test)]
    fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Builder for rule registration: `rule(outputs).using(inputs).by(f)`.
pub(crate) struct RuleBuilder<'r> {
    reactor: &'r mut Reactor,
    outputs: SmallVec<[Slot; 2]>,
    inputs: SmallVec<[Slot; 4]>,
}

impl<'r> RuleBuilder<'r> {
    #[must_use]
    pub fn using(mut self, inputs: impl IntoIterator<Item = Slot>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn by(self, action: impl FnOnce(&mut RuleCx<'_>) + 'static) {
        self.reactor.register(self.outputs, self.inputs, Box::new(action));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CodeRange, NodeKind};

    fn fixture() -> (Ast, Scopes) {
        let mut ast = Ast::new(vec![], NodeId::new(0));
        for _ in 0..4 {
            ast.push(CodeRange::default(), NodeKind::Root { statements: vec![] });
        }
        (ast, Scopes::new())
    }

    #[test]
    fn rule_fires_once_inputs_arrive() {
        let (ast, scopes) = fixture();
        let mut reactor = Reactor::new();
        let (a, b, out) = (NodeId::new(0), NodeId::new(1), NodeId::new(2));

        reactor
            .rule([(out, Attr::Type)])
            .using([(a, Attr::Type), (b, Attr::Type)])
            .by(move |cx| {
                let left = cx.get(a, Attr::Type).as_type().clone();
                assert_eq!(left, Type::Int);
                cx.set(out, Attr::Type, AttrValue::Type(Type::Bool));
            });

        reactor.set(a, Attr::Type, AttrValue::Type(Type::Int));
        reactor.run(&ast, &scopes);
        assert!(reactor.maybe(out, Attr::Type).is_none());

        reactor.set(b, Attr::Type, AttrValue::Type(Type::Float));
        reactor.run(&ast, &scopes);
        assert!(matches!(reactor.maybe(out, Attr::Type), Some(AttrValue::Type(Type::Bool))));
    }

    #[test]
    fn rules_can_chain_through_registered_rules() {
        let (ast, scopes) = fixture();
        let mut reactor = Reactor::new();
        let (a, mid, out) = (NodeId::new(0), NodeId::new(1), NodeId::new(2));

        reactor.rule([(mid, Attr::Type)]).using([(a, Attr::Type)]).by(move |cx| {
            cx.set(mid, Attr::Type, AttrValue::Type(Type::Float));
            cx.rule([(out, Attr::Type)]).using([(mid, Attr::Type)]).by(move |cx| {
                let ty = cx.get(mid, Attr::Type).as_type().clone();
                cx.set(out, Attr::Type, AttrValue::Type(Type::array(ty)));
            });
        });

        reactor.set(a, Attr::Type, AttrValue::Type(Type::Int));
        reactor.run(&ast, &scopes);
        assert!(
            matches!(reactor.maybe(out, Attr::Type), Some(AttrValue::Type(ty)) if *ty == Type::array(Type::Float))
        );
    }

    #[test]
    fn error_for_cancels_dependents_without_deadlock() {
        let (ast, scopes) = fixture();
        let mut reactor = Reactor::new();
        let (bad, mid, out) = (NodeId::new(0), NodeId::new(1), NodeId::new(2));

        // mid depends on bad, out depends on mid
        reactor
            .rule([(mid, Attr::Type)])
            .using([(bad, Attr::Type)])
            .by(move |cx| {
                cx.set(mid, Attr::Type, AttrValue::Type(Type::Int));
            });
        reactor
            .rule([(out, Attr::Type)])
            .using([(mid, Attr::Type)])
            .by(move |cx| {
                cx.set(out, Attr::Type, AttrValue::Type(Type::Int));
            });
        // zero-input rule that gives up on `bad`
        reactor.rule([]).using([]).by(move |cx| {
            cx.error_for("cannot type this", bad, [(bad, Attr::Type)]);
        });

        reactor.run(&ast, &scopes);
        assert_eq!(reactor.error_count(), 1);
        assert!(reactor.maybe(mid, Attr::Type).is_none());
        assert!(reactor.maybe(out, Attr::Type).is_none());
    }

    #[test]
    fn registering_on_a_suppressed_slot_cancels_immediately() {
        let (ast, scopes) = fixture();
        let mut reactor = Reactor::new();
        let (bad, out) = (NodeId::new(0), NodeId::new(1));

        reactor.rule([]).using([]).by(move |cx| {
            cx.error_for("unresolved", bad, [(bad, Attr::Type)]);
        });
        reactor.run(&ast, &scopes);

        reactor
            .rule([(out, Attr::Type)])
            .using([(bad, Attr::Type)])
            .by(move |cx| {
                cx.set(out, Attr::Type, AttrValue::Type(Type::Int));
            });
        reactor.run(&ast, &scopes);
        assert!(reactor.maybe(out, Attr::Type).is_none());
    }

    #[test]
    fn set_is_write_once() {
        let (ast, scopes) = fixture();
        let mut reactor = Reactor::new();
        let node = NodeId::new(0);
        reactor.set(node, Attr::Type, AttrValue::Type(Type::Int));
        reactor.set(node, Attr::Type, AttrValue::Type(Type::Float));
        reactor.run(&ast, &scopes);
        assert!(matches!(reactor.maybe(node, Attr::Type), Some(AttrValue::Type(Type::Int))));
    }
}
