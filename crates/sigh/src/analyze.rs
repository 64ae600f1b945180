use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::{
    ast::{Ast, BinaryOp, Builtin, NodeId, NodeKind, UnaryOp},
    errors::SemanticError,
    reactor::{Attr, AttrValue, Reactor, RuleCx, Slot},
    scopes::{ScopeId, ScopeKind, Scopes},
    types::{
        class_shape_compatible, common_supertype, ClassHandle, FieldMap, FunType, StructType, Type, CONSTRUCTOR_NAME,
    },
};

/// Thread index of the synchronous main program.
pub const MAIN_THREAD: u64 = 0;

/// Stable, non-zero identity hash for an async function declaration.
///
/// Splitmix64 over the arena index; every async function gets its own
/// thread index distinct from the main thread's 0.
#[must_use]
pub fn thread_index_for(node: NodeId) -> u64 {
    let mut z = (node.index() as u64).wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    let index = z ^ (z >> 31);
    if index == MAIN_THREAD { 1 } else { index }
}

/// The decorated AST: every attribute the reactor computed, plus the scope
/// graph. Produced by [`analyze`] only when the program has no semantic
/// errors, so the typed accessors may assume every attribute they read
/// was computed.
pub(crate) struct Analysis {
    attrs: AHashMap<Slot, AttrValue>,
    pub scopes: Scopes,
    pub root_scope: ScopeId,
}

impl Analysis {
    fn attr(&self, node: NodeId, attr: Attr) -> &AttrValue {
        self.attrs
            .get(&(node, attr))
            .unwrap_or_else(|| panic!("attribute {attr} of node {node} was not computed"))
    }

    /// Type of an expression or declaration node.
    pub fn ty(&self, node: NodeId) -> &Type {
        self.attr(node, Attr::Type).as_type()
    }

    /// Resolved declaration of a reference.
    pub fn decl(&self, node: NodeId) -> NodeId {
        self.attr(node, Attr::Decl).as_node()
    }

    /// Scope holding the declaration a reference resolved to.
    pub fn ref_scope(&self, node: NodeId) -> ScopeId {
        self.attr(node, Attr::Scope).as_scope()
    }

    /// Scope introduced by a scope-bearing node.
    pub fn node_scope(&self, node: NodeId) -> ScopeId {
        self.attr(node, Attr::Scope).as_scope()
    }

    /// Thread index a node executes under; 0 is the main thread.
    pub fn thread_index(&self, node: NodeId) -> u64 {
        self.attrs
            .get(&(node, Attr::ThreadIndex))
            .map_or(MAIN_THREAD, AttrValue::as_thread)
    }

    /// The overridden method a `Daddy` call or method declaration points at.
    pub fn parent_method(&self, node: NodeId) -> Option<NodeId> {
        match self.attrs.get(&(node, Attr::Parent)) {
            Some(AttrValue::Node(id)) => Some(*id),
            _ => None,
        }
    }

    /// Member map of a class declaration.
    pub fn class_fields(&self, class_decl: NodeId) -> &Arc<FieldMap> {
        self.attr(class_decl, Attr::Fields).as_fields()
    }
}

/// Runs semantic analysis over the AST.
///
/// Seeds the built-in declarations, walks the tree installing reactor rules,
/// drains the reactor to fixpoint and either returns the decorated AST or
/// every semantic error that was found.
pub(crate) fn analyze(ast: &mut Ast) -> Result<Analysis, Vec<SemanticError>> {
    let builtins = ast.seed_builtins();
    let mut scopes = Scopes::new();
    let root_scope = scopes.new_scope(ast.root, None, ScopeKind::Ordinary);
    let mut reactor = Reactor::new();

    for id in builtins {
        let NodeKind::Synthetic { builtin } = ast.kind(id) else {
            unreachable!("seed_builtins only pushes synthetic nodes");
        };
        let builtin = *builtin;
        scopes.declare(root_scope, ast.decl_name(id), id);
        match builtin {
            Builtin::Print => {
                reactor.set(
                    id,
                    Attr::Type,
                    AttrValue::Type(Type::Fun(FunType::new(Type::String, vec![Type::String]))),
                );
            }
            Builtin::True | Builtin::False => reactor.set(id, Attr::Type, AttrValue::Type(Type::Bool)),
            Builtin::Null => reactor.set(id, Attr::Type, AttrValue::Type(Type::Null)),
            _ => {
                let declared = match builtin {
                    Builtin::Int => Type::Int,
                    Builtin::Float => Type::Float,
                    Builtin::Bool => Type::Bool,
                    Builtin::String => Type::String,
                    Builtin::Void => Type::Void,
                    Builtin::Type => Type::Type,
                    Builtin::Auto => Type::Auto,
                    _ => unreachable!(),
                };
                reactor.set(id, Attr::Type, AttrValue::Type(Type::Type));
                reactor.set(id, Attr::Declared, AttrValue::Type(declared));
            }
        }
    }

    let mut analyzer = Analyzer {
        ast: &*ast,
        reactor,
        scopes,
        scope_stack: vec![root_scope],
        thread_stack: vec![MAIN_THREAD],
        fun_stack: vec![],
        infer_stack: vec![],
    };
    analyzer.reactor.set(ast.root, Attr::Scope, AttrValue::Scope(root_scope));
    analyzer.visit(ast.root);

    let Analyzer { mut reactor, scopes, .. } = analyzer;
    reactor.run(ast, &scopes);

    // rules still waiting after the fixpoint form a dependency cycle; every
    // other unproduced input was suppressed and cancelled its dependents
    let mut stalled_nodes = AHashSet::new();
    for (node, _) in reactor.stalled() {
        if stalled_nodes.insert(node) {
            reactor.report(SemanticError {
                msg: "Cyclic definition: this expression depends on itself".to_owned(),
                node,
                attr: None,
                range: ast.range(node),
            });
        }
    }

    let (attrs, mut errors) = reactor.finish();
    debug!(nodes = ast.len(), errors = errors.len(), "semantic analysis finished");
    if errors.is_empty() {
        Ok(Analysis {
            attrs,
            scopes,
            root_scope,
        })
    } else {
        errors.sort_by_key(|e| (e.range.start, e.node));
        Err(errors)
    }
}

/// Inference context for typing empty array literals.
#[derive(Clone, Copy)]
enum InferCx {
    /// Innermost enclosing variable declaration: use its declared type.
    Var { declared_type: NodeId },
    /// Innermost enclosing call: use the parameter type at this argument
    /// position of the callee.
    Call { callee: NodeId, index: usize },
}

struct Analyzer<'a> {
    ast: &'a Ast,
    reactor: Reactor,
    scopes: Scopes,
    scope_stack: Vec<ScopeId>,
    thread_stack: Vec<u64>,
    fun_stack: Vec<NodeId>,
    infer_stack: Vec<InferCx>,
}

impl<'a> Analyzer<'a> {
    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack never empty")
    }

    fn current_thread(&self) -> u64 {
        *self.thread_stack.last().expect("thread stack never empty")
    }

    fn report(&mut self, msg: impl Into<String>, node: NodeId) {
        let range = self.ast.range(node);
        self.reactor.report(SemanticError {
            msg: msg.into(),
            node,
            attr: None,
            range,
        });
    }

    fn visit(&mut self, node: NodeId) {
        let kind = self.ast.kind(node).clone();

        // every statement and expression carries the thread index it must
        // execute under; async function bodies tag themselves with the
        // function's identity hash
        match &kind {
            NodeKind::SimpleType { .. } | NodeKind::ArrayType { .. } | NodeKind::UnbornType { .. } | NodeKind::Synthetic { .. } => {}
            NodeKind::FunDecl { return_type, .. } => {
                let thread = if matches!(self.ast.kind(*return_type), NodeKind::UnbornType { .. }) {
                    thread_index_for(node)
                } else {
                    self.current_thread()
                };
                self.reactor.set(node, Attr::ThreadIndex, AttrValue::Thread(thread));
            }
            _ => {
                let thread = self.current_thread();
                self.reactor.set(node, Attr::ThreadIndex, AttrValue::Thread(thread));
            }
        }

        match kind {
            NodeKind::Root { statements } => {
                for statement in statements {
                    self.visit(statement);
                }
            }
            NodeKind::Block { statements } => self.visit_block(node, &statements),
            NodeKind::VarDecl {
                name,
                declared_type,
                initializer,
            } => self.visit_var_decl(node, &name, declared_type, initializer),
            NodeKind::FieldDecl { name, declared_type } => {
                self.scopes.declare(self.current_scope(), name, node);
                self.visit(declared_type);
                self.reactor
                    .rule([(node, Attr::Type)])
                    .using([(declared_type, Attr::Value)])
                    .by(move |cx| {
                        let ty = cx.get(declared_type, Attr::Value);
                        cx.set(node, Attr::Type, ty);
                    });
            }
            NodeKind::FunDecl {
                name,
                params,
                return_type,
                body,
            } => self.visit_fun_decl(node, &name, &params, return_type, body),
            NodeKind::Param { name, declared_type } => {
                self.scopes.declare(self.current_scope(), name, node);
                self.visit(declared_type);
                self.reactor
                    .rule([(node, Attr::Type)])
                    .using([(declared_type, Attr::Value)])
                    .by(move |cx| {
                        let ty = cx.get(declared_type, Attr::Value);
                        cx.set(node, Attr::Type, ty);
                    });
            }
            NodeKind::StructDecl { name, fields } => self.visit_struct_decl(node, &name, &fields),
            NodeKind::ClassDecl { name, parent, members } => {
                self.visit_class_decl(node, &name, parent.as_deref(), &members);
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.visit_if(node, condition, then_branch, else_branch),
            NodeKind::While { condition, body } => {
                self.visit(condition);
                self.visit(body);
                self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));
                self.reactor.rule([]).using([(condition, Attr::Type)]).by(move |cx| {
                    let ty = cx.get(condition, Attr::Type);
                    if *ty.as_type() != Type::Bool {
                        cx.error(
                            format!("While condition must be a Bool, got {}", ty.as_type()),
                            condition,
                        );
                    }
                });
            }
            NodeKind::Return { value } => self.visit_return(node, value),
            NodeKind::ExprStmt { expr } => {
                self.visit(expr);
                self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));
            }
            NodeKind::Born { fun_ref, var_ref } => self.visit_born(node, fun_ref, var_ref),
            NodeKind::IntLiteral(_) => self.reactor.set(node, Attr::Type, AttrValue::Type(Type::Int)),
            NodeKind::FloatLiteral(_) => self.reactor.set(node, Attr::Type, AttrValue::Type(Type::Float)),
            NodeKind::StringLiteral(_) => self.reactor.set(node, Attr::Type, AttrValue::Type(Type::String)),
            NodeKind::Reference { name } => self.visit_reference(node, &name),
            NodeKind::Constructor { reference } => self.visit_constructor(node, reference),
            NodeKind::ArrayLiteral { elements } => self.visit_array_literal(node, &elements),
            NodeKind::ArrayAccess { array, index } => {
                self.visit(array);
                self.visit(index);
                self.reactor
                    .rule([(node, Attr::Type)])
                    .using([(array, Attr::Type), (index, Attr::Type)])
                    .by(move |cx| {
                        let index_ty = cx.get(index, Attr::Type);
                        if *index_ty.as_type() != Type::Int {
                            cx.error(
                                format!("Indexing an array with a non-Int index of type {}", index_ty.as_type()),
                                index,
                            );
                        }
                        let array_ty = cx.get(array, Attr::Type);
                        match array_ty.as_type() {
                            Type::Array(element) => {
                                let element = element.as_ref().clone();
                                cx.set(node, Attr::Type, AttrValue::Type(element));
                            }
                            other => {
                                let msg = format!("Trying to index a non-array expression of type {other}");
                                cx.error_for(msg, node, [(node, Attr::Type)]);
                            }
                        }
                    });
            }
            NodeKind::FieldAccess { stem, field } => self.visit_field_access(node, stem, &field),
            NodeKind::FunCall { callee, args } => self.visit_fun_call(node, callee, &args),
            NodeKind::DaddyCall { args } => self.visit_daddy_call(node, &args),
            NodeKind::Assignment { lhs, rhs } => self.visit_assignment(node, lhs, rhs),
            NodeKind::Binary { op, left, right } => self.visit_binary(node, op, left, right),
            NodeKind::Unary { op, operand } => {
                self.visit(operand);
                self.reactor
                    .rule([(node, Attr::Type)])
                    .using([(operand, Attr::Type)])
                    .by(move |cx| {
                        let ty = cx.get(operand, Attr::Type).as_type().clone();
                        match op {
                            UnaryOp::Not => {
                                if ty == Type::Bool {
                                    cx.set(node, Attr::Type, AttrValue::Type(Type::Bool));
                                } else {
                                    cx.error_for(
                                        format!("Negating a non-Bool expression of type {ty}"),
                                        node,
                                        [(node, Attr::Type)],
                                    );
                                }
                            }
                            UnaryOp::Neg => {
                                let effective = ty.unwrap_unborn().clone();
                                if effective.is_numeric() {
                                    cx.set(node, Attr::Type, AttrValue::Type(effective));
                                } else {
                                    cx.error_for(
                                        format!("Arithmetic negation of a non-numeric expression of type {ty}"),
                                        node,
                                        [(node, Attr::Type)],
                                    );
                                }
                            }
                        }
                    });
            }
            NodeKind::SimpleType { name } => self.visit_simple_type(node, &name),
            NodeKind::ArrayType { element } => {
                self.visit(element);
                self.reactor
                    .rule([(node, Attr::Value)])
                    .using([(element, Attr::Value)])
                    .by(move |cx| {
                        let element_ty = cx.get(element, Attr::Value).as_type().clone();
                        cx.set(node, Attr::Value, AttrValue::Type(Type::array(element_ty)));
                    });
            }
            NodeKind::UnbornType { inner } => {
                self.visit(inner);
                self.reactor
                    .rule([(node, Attr::Value)])
                    .using([(inner, Attr::Value)])
                    .by(move |cx| {
                        let inner_ty = cx.get(inner, Attr::Value).as_type().clone();
                        cx.set(node, Attr::Value, AttrValue::Type(Type::unborn(inner_ty)));
                    });
            }
            NodeKind::Synthetic { .. } => {}
        }
    }

    fn visit_block(&mut self, node: NodeId, statements: &[NodeId]) {
        let scope = self.scopes.new_scope(node, Some(self.current_scope()), ScopeKind::Ordinary);
        self.reactor.set(node, Attr::Scope, AttrValue::Scope(scope));
        self.scope_stack.push(scope);
        for &statement in statements {
            self.visit(statement);
        }
        self.scope_stack.pop();

        // a block returns when any of its container children (blocks, ifs,
        // returns) unconditionally returns
        let containers: Vec<NodeId> = statements
            .iter()
            .copied()
            .filter(|&s| {
                matches!(
                    self.ast.kind(s),
                    NodeKind::Block { .. } | NodeKind::If { .. } | NodeKind::Return { .. }
                )
            })
            .collect();
        if containers.is_empty() {
            self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));
        } else {
            let inputs: Vec<Slot> = containers.iter().map(|&s| (s, Attr::Returns)).collect();
            self.reactor
                .rule([(node, Attr::Returns)])
                .using(inputs.clone())
                .by(move |cx| {
                    let returns = inputs.iter().any(|&(s, _)| cx.get(s, Attr::Returns).as_bool());
                    cx.set(node, Attr::Returns, AttrValue::Bool(returns));
                });
        }
    }

    fn visit_var_decl(&mut self, node: NodeId, name: &str, declared_type: NodeId, initializer: NodeId) {
        self.scopes.declare(self.current_scope(), name, node);
        self.visit(declared_type);
        self.infer_stack.push(InferCx::Var { declared_type });
        self.visit(initializer);
        self.infer_stack.pop();
        self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));

        let name = name.to_owned();
        self.reactor
            .rule([(node, Attr::Type)])
            .using([(declared_type, Attr::Value), (initializer, Attr::Type)])
            .by(move |cx| {
                let declared = cx.get(declared_type, Attr::Value).as_type().clone();
                let init = cx.get(initializer, Attr::Type).as_type().clone();
                let resolved = match &declared {
                    Type::Auto => {
                        if init == Type::Auto {
                            cx.error_for(
                                format!("Cannot infer a type for variable `{name}`"),
                                node,
                                [(node, Attr::Type)],
                            );
                            return;
                        }
                        init.clone()
                    }
                    Type::Array(element) if **element == Type::Auto => {
                        cx.error_for(
                            format!("Cannot infer the element type of array variable `{name}`"),
                            node,
                            [(node, Attr::Type)],
                        );
                        return;
                    }
                    other => other.clone(),
                };
                check_assign(
                    cx,
                    &init,
                    &resolved,
                    initializer,
                    format!("Trying to initialize variable `{name}` of type {resolved} with a value of type {init}"),
                );
                cx.set(node, Attr::Type, AttrValue::Type(resolved));
            });
    }

    fn visit_fun_decl(&mut self, node: NodeId, name: &str, params: &[NodeId], return_type: NodeId, body: NodeId) {
        let enclosing = self.current_scope();
        let enclosing_class = (self.scopes.get(enclosing).kind == ScopeKind::Class).then(|| self.scopes.get(enclosing).node);
        let class_name = enclosing_class.map(|class| self.ast.decl_name(class).to_owned());
        let is_constructor = class_name.as_deref() == Some(name);
        let effective_name = if is_constructor {
            CONSTRUCTOR_NAME.to_owned()
        } else {
            name.to_owned()
        };

        if name == "Daddy" {
            self.report("Daddy cannot be used as a function name", node);
        }
        self.scopes.declare(enclosing, effective_name.clone(), node);

        let scope = self.scopes.new_scope(node, Some(enclosing), ScopeKind::Ordinary);
        self.reactor.set(node, Attr::Scope, AttrValue::Scope(scope));
        self.scope_stack.push(scope);
        let thread = self
            .reactor
            .maybe(node, Attr::ThreadIndex)
            .map_or(MAIN_THREAD, AttrValue::as_thread);
        self.thread_stack.push(thread);
        self.fun_stack.push(node);
        for &param in params {
            self.visit(param);
        }
        self.visit(return_type);
        self.visit(body);
        self.fun_stack.pop();
        self.thread_stack.pop();
        self.scope_stack.pop();
        self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));

        // the function's own type
        let param_slots: Vec<Slot> = params.iter().map(|&p| (p, Attr::Type)).collect();
        let params_owned: Vec<NodeId> = params.to_vec();
        let mut inputs = param_slots;
        inputs.push((return_type, Attr::Value));
        self.reactor
            .rule([(node, Attr::Type)])
            .using(inputs)
            .by(move |cx| {
                let ret = cx.get(return_type, Attr::Value).as_type().clone();
                let param_types = params_owned
                    .iter()
                    .map(|&p| cx.get(p, Attr::Type).as_type().clone())
                    .collect();
                cx.set(node, Attr::Type, AttrValue::Type(Type::Fun(FunType::new(ret, param_types))));
            });

        if is_constructor {
            let fun_name = name.to_owned();
            self.reactor.rule([]).using([(return_type, Attr::Value)]).by(move |cx| {
                if *cx.get(return_type, Attr::Value).as_type() != Type::Void {
                    cx.error(format!("Constructor `{fun_name}` must have return type Void"), node);
                }
            });
        }

        // unconditional-return requirement, against the Unborn-unwrapped type
        let fun_name = name.to_owned();
        self.reactor
            .rule([])
            .using([(body, Attr::Returns), (return_type, Attr::Value)])
            .by(move |cx| {
                let ret = cx.get(return_type, Attr::Value).as_type().clone();
                let returns = cx.get(body, Attr::Returns).as_bool();
                if *ret.unwrap_unborn() != Type::Void && !returns {
                    cx.error(format!("Missing return in function `{fun_name}`"), node);
                }
            });

        // methods resolve their overridden parent, or deliberately Void
        if let Some(class) = enclosing_class {
            let method_name = effective_name;
            self.reactor
                .rule([(node, Attr::Parent)])
                .using([(class, Attr::Ancestors)])
                .by(move |cx| {
                    let ancestors = cx.get(class, Attr::Ancestors).as_nodes().to_vec();
                    let parent = ancestors.get(1).copied();
                    let resolved = parent.and_then(|p| cx.scopes.lookup_member(cx.ast, p, &method_name));
                    match resolved {
                        Some((decl, _)) if matches!(cx.ast.kind(decl), NodeKind::FunDecl { .. }) => {
                            cx.set(node, Attr::Parent, AttrValue::Node(decl));
                        }
                        _ => cx.set(node, Attr::Parent, AttrValue::Void),
                    }
                });
        }
    }

    fn visit_struct_decl(&mut self, node: NodeId, name: &str, fields: &[NodeId]) {
        self.scopes.declare(self.current_scope(), name, node);
        let scope = self.scopes.new_scope(node, Some(self.current_scope()), ScopeKind::Ordinary);
        self.reactor.set(node, Attr::Scope, AttrValue::Scope(scope));
        self.scope_stack.push(scope);
        for &field in fields {
            self.visit(field);
        }
        self.scope_stack.pop();
        self.reactor.set(node, Attr::Type, AttrValue::Type(Type::Type));
        self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));

        let field_slots: Vec<Slot> = fields.iter().map(|&f| (f, Attr::Type)).collect();
        let fields_owned: Vec<NodeId> = fields.to_vec();
        let struct_name = name.to_owned();
        self.reactor
            .rule([(node, Attr::Declared)])
            .using(field_slots)
            .by(move |cx| {
                let mut map = FieldMap::default();
                for &field in &fields_owned {
                    let field_name = cx.ast.decl_name(field).to_owned();
                    let ty = cx.get(field, Attr::Type).as_type().clone();
                    map.insert(field_name, ty);
                }
                cx.set(
                    node,
                    Attr::Declared,
                    AttrValue::Type(Type::Struct(StructType {
                        name: struct_name.clone(),
                        fields: map,
                    })),
                );
            });
    }

    fn visit_class_decl(&mut self, node: NodeId, name: &str, parent: Option<&str>, members: &[NodeId]) {
        if !name.chars().next().is_some_and(char::is_uppercase) {
            self.report(format!("Class names must be capitalized: `{name}`"), node);
        }
        let enclosing = self.current_scope();
        self.scopes.declare(enclosing, name, node);
        let scope = self.scopes.new_scope(node, Some(enclosing), ScopeKind::Class);
        self.reactor.set(node, Attr::Scope, AttrValue::Scope(scope));
        self.scope_stack.push(scope);
        for &member in members {
            self.visit(member);
        }
        self.scope_stack.pop();
        self.reactor.set(node, Attr::Type, AttrValue::Type(Type::Type));
        self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));
        // the declared type is a nominal handle, so a class whose fields
        // mention the class itself resolves without a cycle
        self.reactor.set(
            node,
            Attr::Declared,
            AttrValue::Type(Type::Class(ClassHandle {
                name: name.to_owned(),
                decl: node,
            })),
        );

        // every class declares its own constructor
        let has_constructor = members
            .iter()
            .any(|&m| matches!(self.ast.kind(m), NodeKind::FunDecl { name: n, .. } if n == name));
        if !has_constructor {
            self.report(format!("Missing constructor for class `{name}`"), node);
        }

        // ancestors: self first, following parent names lexically; runs at
        // drain time, once every class scope exists
        let class_name = name.to_owned();
        let parent_name = parent.map(str::to_owned);
        self.reactor
            .rule([(node, Attr::Ancestors)])
            .using([])
            .by(move |cx| {
                let mut chain = vec![node];
                let mut current_name = parent_name.clone();
                let mut lookup_from = enclosing;
                while let Some(ancestor_name) = current_name {
                    let Some((decl, _)) = cx.scopes.lookup(cx.ast, lookup_from, &ancestor_name) else {
                        cx.error_for(
                            format!("Undeclared ancestor of class `{class_name}`: `{ancestor_name}`"),
                            node,
                            [(node, Attr::Ancestors), (node, Attr::Fields)],
                        );
                        return;
                    };
                    let NodeKind::ClassDecl { parent, .. } = cx.ast.kind(decl) else {
                        cx.error_for(
                            format!("Parent of class `{class_name}` is not a class: `{ancestor_name}`"),
                            node,
                            [(node, Attr::Ancestors), (node, Attr::Fields)],
                        );
                        return;
                    };
                    if chain.contains(&decl) {
                        let path: Vec<&str> = chain.iter().map(|&c| cx.ast.decl_name(c)).collect();
                        let msg = format!(
                            "Cyclic inheritance: {} -> {ancestor_name}",
                            path.join(" -> ")
                        );
                        cx.error_for(msg, node, [(node, Attr::Ancestors), (node, Attr::Fields)]);
                        return;
                    }
                    current_name = parent.clone();
                    let class_scope = cx
                        .scopes
                        .class_scope(decl)
                        .expect("class declarations always register a scope");
                    lookup_from = cx.scopes.get(class_scope).parent.expect("class scopes have a parent");
                    chain.push(decl);
                }
                cx.set(node, Attr::Ancestors, AttrValue::Nodes(chain));
            });

        // member map: iterate ancestor bodies base-first, subclasses override
        self.reactor
            .rule([(node, Attr::Fields)])
            .using([(node, Attr::Ancestors)])
            .by(move |cx| {
                let chain = cx.get(node, Attr::Ancestors).as_nodes().to_vec();
                let mut ordered: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
                for &class in chain.iter().rev() {
                    let NodeKind::ClassDecl { members, .. } = cx.ast.kind(class) else {
                        unreachable!("ancestors only contains class declarations");
                    };
                    ordered.push((class, members.clone()));
                }
                let inputs: Vec<Slot> = ordered
                    .iter()
                    .flat_map(|(_, members)| members.iter().map(|&m| (m, Attr::Type)))
                    .collect();
                cx.rule([(node, Attr::Fields)])
                    .using(inputs)
                    .by(move |cx| {
                        let mut map = FieldMap::default();
                        for (class, members) in &ordered {
                            let owner_name = cx.ast.decl_name(*class).to_owned();
                            for &member in members {
                                let member_name = member_name(cx.ast, &owner_name, member);
                                let ty = cx.get(member, Attr::Type).as_type().clone();
                                let is_fun = matches!(cx.ast.kind(member), NodeKind::FunDecl { .. });
                                match map.get(&member_name) {
                                    None => {
                                        map.insert(member_name, ty);
                                    }
                                    Some(_) if !is_fun => {
                                        cx.error(
                                            "cannot override variable - can only override methods".to_owned(),
                                            member,
                                        );
                                    }
                                    Some(inherited) if member_name != CONSTRUCTOR_NAME && *inherited != ty => {
                                        cx.error(
                                            format!(
                                                "Overriding method `{member_name}` must keep the inherited signature {inherited}, got {ty}"
                                            ),
                                            member,
                                        );
                                    }
                                    Some(_) => {
                                        map.insert(member_name, ty);
                                    }
                                }
                            }
                        }
                        cx.set(node, Attr::Fields, AttrValue::Fields(Arc::new(map)));
                    });
            });
    }

    fn visit_if(&mut self, node: NodeId, condition: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) {
        self.visit(condition);
        self.visit(then_branch);
        if let Some(branch) = else_branch {
            self.visit(branch);
        }
        self.reactor.rule([]).using([(condition, Attr::Type)]).by(move |cx| {
            let ty = cx.get(condition, Attr::Type);
            if *ty.as_type() != Type::Bool {
                cx.error(format!("If condition must be a Bool, got {}", ty.as_type()), condition);
            }
        });
        match else_branch {
            None => self.reactor.set(node, Attr::Returns, AttrValue::Bool(false)),
            Some(branch) => {
                self.reactor
                    .rule([(node, Attr::Returns)])
                    .using([(then_branch, Attr::Returns), (branch, Attr::Returns)])
                    .by(move |cx| {
                        let returns =
                            cx.get(then_branch, Attr::Returns).as_bool() && cx.get(branch, Attr::Returns).as_bool();
                        cx.set(node, Attr::Returns, AttrValue::Bool(returns));
                    });
            }
        }
    }

    fn visit_return(&mut self, node: NodeId, value: Option<NodeId>) {
        if let Some(value) = value {
            self.visit(value);
        }
        self.reactor.set(node, Attr::Returns, AttrValue::Bool(true));

        // a top-level return ends the program and is not type-checked
        let Some(&fun) = self.fun_stack.last() else {
            return;
        };
        let NodeKind::FunDecl { return_type, .. } = self.ast.kind(fun) else {
            unreachable!("fun stack only holds function declarations");
        };
        let return_type = *return_type;
        match value {
            None => {
                self.reactor.rule([]).using([(return_type, Attr::Value)]).by(move |cx| {
                    let ret = cx.get(return_type, Attr::Value).as_type().clone();
                    if *ret.unwrap_unborn() != Type::Void {
                        cx.error(
                            format!("Return without a value in a function returning {ret}"),
                            node,
                        );
                    }
                });
            }
            Some(value) => {
                self.reactor
                    .rule([])
                    .using([(return_type, Attr::Value), (value, Attr::Type)])
                    .by(move |cx| {
                        let ret = cx.get(return_type, Attr::Value).as_type().clone();
                        let effective = ret.unwrap_unborn().clone();
                        let value_ty = cx.get(value, Attr::Type).as_type().clone();
                        if effective == Type::Void {
                            cx.error(
                                format!("Returning a value of type {value_ty} from a Void function"),
                                node,
                            );
                            return;
                        }
                        check_assign(
                            cx,
                            &value_ty,
                            &effective,
                            value,
                            format!("Cannot return a value of type {value_ty} from a function returning {ret}"),
                        );
                    });
            }
        }
    }

    fn visit_born(&mut self, node: NodeId, fun_ref: NodeId, var_ref: Option<NodeId>) {
        self.visit(fun_ref);
        if let Some(var_ref) = var_ref {
            self.visit(var_ref);
        }
        self.reactor.set(node, Attr::Returns, AttrValue::Bool(false));

        self.reactor.rule([]).using([(fun_ref, Attr::Decl)]).by(move |cx| {
            let decl = cx.get(fun_ref, Attr::Decl).as_node();
            let is_fun = matches!(cx.ast.kind(decl), NodeKind::FunDecl { .. });
            let is_var = matches!(cx.ast.kind(decl), NodeKind::VarDecl { .. });
            if !is_fun && !is_var {
                cx.error(
                    "born expects an async function or a variable holding an unborn value".to_owned(),
                    fun_ref,
                );
                return;
            }
            cx.rule([]).using([(decl, Attr::Type)]).by(move |cx| {
                let decl_ty = cx.get(decl, Attr::Type).as_type().clone();
                let payload = match &decl_ty {
                    Type::Fun(fun) if matches!(*fun.ret, Type::Unborn(_)) => fun.ret.unwrap_unborn().clone(),
                    Type::Unborn(inner) if is_var => inner.as_ref().clone(),
                    _ => {
                        cx.error(
                            format!("born expects an async function, got a value of type {decl_ty}"),
                            fun_ref,
                        );
                        return;
                    }
                };
                let Some(var_ref) = var_ref else { return };
                cx.rule([]).using([(var_ref, Attr::Decl)]).by(move |cx| {
                    let var_decl = cx.get(var_ref, Attr::Decl).as_node();
                    if !matches!(cx.ast.kind(var_decl), NodeKind::VarDecl { .. }) {
                        cx.error("The second argument of born must be a variable".to_owned(), var_ref);
                        return;
                    }
                    let payload = payload.clone();
                    cx.rule([]).using([(var_decl, Attr::Type)]).by(move |cx| {
                        if payload == Type::Void {
                            cx.error(
                                "Cannot store the result of a Void async function in a variable".to_owned(),
                                var_ref,
                            );
                            return;
                        }
                        let var_ty = cx.get(var_decl, Attr::Type).as_type().clone();
                        if !payload.assigns_to(&var_ty) {
                            cx.error(
                                format!("Cannot store an async result of type {payload} in a variable of type {var_ty}"),
                                var_ref,
                            );
                        }
                    });
                });
            });
        });
    }

    fn visit_reference(&mut self, node: NodeId, name: &str) {
        let scope = self.current_scope();
        let range = self.ast.range(node);
        if let Some((decl, found_in)) = self.scopes.lookup(self.ast, scope, name) {
            self.reactor.set(node, Attr::Decl, AttrValue::Node(decl));
            self.reactor.set(node, Attr::Scope, AttrValue::Scope(found_in));
            self.reactor
                .rule([(node, Attr::Type)])
                .using([(decl, Attr::Type)])
                .by(move |cx| {
                    let ty = cx.get(decl, Attr::Type);
                    cx.set(node, Attr::Type, ty);
                });
            return;
        }

        // unresolved so far: retry once every scope and declaration exists
        let name = name.to_owned();
        self.reactor
            .rule([(node, Attr::Decl), (node, Attr::Scope), (node, Attr::Type)])
            .using([])
            .by(move |cx| {
                let Some((decl, found_in)) = cx.scopes.lookup(cx.ast, scope, &name) else {
                    cx.error_for(
                        format!("Could not resolve: {name}"),
                        node,
                        [(node, Attr::Type), (node, Attr::Decl), (node, Attr::Scope)],
                    );
                    return;
                };
                let use_before_decl = matches!(cx.ast.kind(decl), NodeKind::VarDecl { .. })
                    && found_in == scope
                    && range.precedes(cx.ast.range(decl));
                if use_before_decl {
                    cx.error_for(
                        format!("Variable used before declaration: {name}"),
                        node,
                        [(node, Attr::Type), (node, Attr::Decl), (node, Attr::Scope)],
                    );
                    return;
                }
                cx.set(node, Attr::Decl, AttrValue::Node(decl));
                cx.set(node, Attr::Scope, AttrValue::Scope(found_in));
                cx.rule([(node, Attr::Type)]).using([(decl, Attr::Type)]).by(move |cx| {
                    let ty = cx.get(decl, Attr::Type);
                    cx.set(node, Attr::Type, ty);
                });
            });
    }

    fn visit_constructor(&mut self, node: NodeId, reference: NodeId) {
        self.visit(reference);
        self.reactor
            .rule([(node, Attr::Type)])
            .using([(reference, Attr::Decl)])
            .by(move |cx| {
                let decl = cx.get(reference, Attr::Decl).as_node();
                if !matches!(cx.ast.kind(decl), NodeKind::StructDecl { .. }) {
                    cx.error_for(
                        "$ must be applied to a struct".to_owned(),
                        node,
                        [(node, Attr::Type)],
                    );
                    return;
                }
                cx.rule([(node, Attr::Type)]).using([(decl, Attr::Declared)]).by(move |cx| {
                    let declared = cx.get(decl, Attr::Declared).as_type().clone();
                    let Type::Struct(struct_ty) = &declared else {
                        unreachable!("struct declarations declare struct types");
                    };
                    let params = struct_ty.fields.values().cloned().collect();
                    cx.set(
                        node,
                        Attr::Type,
                        AttrValue::Type(Type::Fun(FunType::new(declared.clone(), params))),
                    );
                });
            });
    }

    fn visit_array_literal(&mut self, node: NodeId, elements: &[NodeId]) {
        let context = self.infer_stack.last().copied();
        for &element in elements {
            self.visit(element);
        }
        if !elements.is_empty() {
            let inputs: Vec<Slot> = elements.iter().map(|&e| (e, Attr::Type)).collect();
            let elements_owned: Vec<NodeId> = elements.to_vec();
            self.reactor
                .rule([(node, Attr::Type)])
                .using(inputs)
                .by(move |cx| {
                    let mut supertype = cx.get(elements_owned[0], Attr::Type).as_type().clone();
                    for &element in &elements_owned[1..] {
                        let ty = cx.get(element, Attr::Type).as_type().clone();
                        match common_supertype(&supertype, &ty) {
                            Some(sup) => supertype = sup,
                            None => {
                                cx.error_for(
                                    "No common supertype for the elements of this array literal".to_owned(),
                                    node,
                                    [(node, Attr::Type)],
                                );
                                return;
                            }
                        }
                    }
                    cx.set(node, Attr::Type, AttrValue::Type(Type::array(supertype)));
                });
            return;
        }

        // an empty literal takes its type from the enclosing declaration or
        // call argument; with no such context it deliberately has none
        match context {
            Some(InferCx::Var { declared_type }) => {
                self.reactor
                    .rule([(node, Attr::Type)])
                    .using([(declared_type, Attr::Value)])
                    .by(move |cx| {
                        let declared = cx.get(declared_type, Attr::Value).as_type().clone();
                        match declared {
                            Type::Array(_) => cx.set(node, Attr::Type, AttrValue::Type(declared)),
                            _ => cx.error_for(
                                "Cannot infer the type of this empty array literal".to_owned(),
                                node,
                                [(node, Attr::Type)],
                            ),
                        }
                    });
            }
            Some(InferCx::Call { callee, index }) => {
                self.reactor
                    .rule([(node, Attr::Type)])
                    .using([(callee, Attr::Type)])
                    .by(move |cx| {
                        let callee_ty = cx.get(callee, Attr::Type).as_type().clone();
                        match callee_ty {
                            Type::Fun(fun) => set_empty_array_from_param(cx, node, fun.params.get(index)),
                            Type::Type => {
                                cx.rule([(node, Attr::Type)]).using([(callee, Attr::Decl)]).by(move |cx| {
                                    let decl = cx.get(callee, Attr::Decl).as_node();
                                    if !matches!(cx.ast.kind(decl), NodeKind::ClassDecl { .. }) {
                                        cx.error_for(
                                            "Cannot infer the type of this empty array literal".to_owned(),
                                            node,
                                            [(node, Attr::Type)],
                                        );
                                        return;
                                    }
                                    cx.rule([(node, Attr::Type)]).using([(decl, Attr::Fields)]).by(move |cx| {
                                        let fields = cx.get(decl, Attr::Fields).as_fields().clone();
                                        let param = match fields.get(CONSTRUCTOR_NAME) {
                                            Some(Type::Fun(ctor)) => ctor.params.get(index).cloned(),
                                            _ => None,
                                        };
                                        set_empty_array_from_param(cx, node, param.as_ref());
                                    });
                                });
                            }
                            _ => cx.error_for(
                                "Cannot infer the type of this empty array literal".to_owned(),
                                node,
                                [(node, Attr::Type)],
                            ),
                        }
                    });
            }
            None => {
                let range = self.ast.range(node);
                self.reactor.report(SemanticError {
                    msg: "Cannot infer the type of this empty array literal".to_owned(),
                    node,
                    attr: Some(Attr::Type),
                    range,
                });
                self.reactor.suppress((node, Attr::Type));
            }
        }
    }

    fn visit_field_access(&mut self, node: NodeId, stem: NodeId, field: &str) {
        self.visit(stem);
        let field = field.to_owned();
        self.reactor
            .rule([(node, Attr::Type)])
            .using([(stem, Attr::Type)])
            .by(move |cx| {
                let stem_ty = cx.get(stem, Attr::Type).as_type().clone();
                match stem_ty {
                    Type::Array(_) => {
                        if field == "length" {
                            cx.set(node, Attr::Type, AttrValue::Type(Type::Int));
                        } else {
                            cx.error_for(
                                format!("Arrays only have a `length` field, not `{field}`"),
                                node,
                                [(node, Attr::Type)],
                            );
                        }
                    }
                    Type::Struct(struct_ty) => match struct_ty.fields.get(&field) {
                        Some(ty) => {
                            let ty = ty.clone();
                            cx.set(node, Attr::Type, AttrValue::Type(ty));
                        }
                        None => cx.error_for(
                            format!("Unknown field `{field}` in struct `{}`", struct_ty.name),
                            node,
                            [(node, Attr::Type)],
                        ),
                    },
                    Type::Class(handle) => {
                        let field = field.clone();
                        cx.rule([(node, Attr::Type)])
                            .using([(handle.decl, Attr::Fields)])
                            .by(move |cx| {
                                let fields = cx.get(handle.decl, Attr::Fields).as_fields().clone();
                                match fields.get(&field) {
                                    None => cx.error_for(
                                        format!("Unknown member `{field}` in class `{}`", handle.name),
                                        node,
                                        [(node, Attr::Type)],
                                    ),
                                    Some(Type::Fun(fun)) if matches!(*fun.ret, Type::Unborn(_)) => {
                                        cx.error_for(
                                            format!(
                                                "Async method `{field}` may only be called from inside class `{}`",
                                                handle.name
                                            ),
                                            node,
                                            [(node, Attr::Type)],
                                        );
                                    }
                                    Some(ty) => {
                                        let ty = ty.clone();
                                        cx.set(node, Attr::Type, AttrValue::Type(ty));
                                    }
                                }
                            });
                    }
                    Type::Null => cx.error_for(
                        "Field access on null".to_owned(),
                        node,
                        [(node, Attr::Type)],
                    ),
                    other => cx.error_for(
                        format!("Trying to access field `{field}` on an expression of type {other}"),
                        node,
                        [(node, Attr::Type)],
                    ),
                }
            });
    }

    fn visit_fun_call(&mut self, node: NodeId, callee: NodeId, args: &[NodeId]) {
        self.visit(callee);
        for (index, &arg) in args.iter().enumerate() {
            self.reactor.set(arg, Attr::ArgIndex, AttrValue::Index(index));
            self.infer_stack.push(InferCx::Call { callee, index });
            self.visit(arg);
            self.infer_stack.pop();
        }

        let args_owned: Vec<NodeId> = args.to_vec();
        self.reactor
            .rule([(node, Attr::Type)])
            .using([(callee, Attr::Type)])
            .by(move |cx| {
                let callee_ty = cx.get(callee, Attr::Type).as_type().clone();
                match callee_ty {
                    Type::Fun(fun) => {
                        check_call_args(cx, node, &args_owned, fun.params.clone(), Some((*fun.ret).clone()));
                    }
                    Type::Type => {
                        let args_owned = args_owned.clone();
                        cx.rule([(node, Attr::Type)]).using([(callee, Attr::Decl)]).by(move |cx| {
                            let decl = cx.get(callee, Attr::Decl).as_node();
                            if !matches!(cx.ast.kind(decl), NodeKind::ClassDecl { .. }) {
                                cx.error_for(
                                    "Only classes can be instantiated by calling; structs use $Name(...)".to_owned(),
                                    node,
                                    [(node, Attr::Type)],
                                );
                                return;
                            }
                            let args_owned = args_owned.clone();
                            cx.rule([(node, Attr::Type)])
                                .using([(decl, Attr::Fields), (decl, Attr::Declared)])
                                .by(move |cx| {
                                    let fields = cx.get(decl, Attr::Fields).as_fields().clone();
                                    let declared = cx.get(decl, Attr::Declared).as_type().clone();
                                    let Some(Type::Fun(ctor)) = fields.get(CONSTRUCTOR_NAME) else {
                                        // constructor absence was already reported at the class
                                        cx.reactor.suppress((node, Attr::Type));
                                        return;
                                    };
                                    check_call_args(cx, node, &args_owned, ctor.params.clone(), Some(declared));
                                });
                        });
                    }
                    Type::Null => cx.error_for(
                        "Calling a null value".to_owned(),
                        node,
                        [(node, Attr::Type)],
                    ),
                    other => cx.error_for(
                        format!("Trying to call a non-function value of type {other}"),
                        node,
                        [(node, Attr::Type)],
                    ),
                }
            });
    }

    fn visit_daddy_call(&mut self, node: NodeId, args: &[NodeId]) {
        // find the enclosing method; plain functions, the root and class
        // bodies in between make the call illegal
        let mut method = None;
        for &scope in self.scope_stack.iter().rev() {
            let data = self.scopes.get(scope);
            match self.ast.kind(data.node) {
                NodeKind::Block { .. } => {}
                NodeKind::FunDecl { .. } => {
                    let parent_is_class = data
                        .parent
                        .is_some_and(|p| self.scopes.get(p).kind == ScopeKind::Class);
                    if parent_is_class {
                        method = Some(data.node);
                    }
                    break;
                }
                _ => break,
            }
        }
        for &arg in args {
            self.visit(arg);
        }
        let Some(method) = method else {
            self.report("Daddy calls must be located inside a method", node);
            self.reactor.suppress((node, Attr::Type));
            return;
        };

        let args_owned: Vec<NodeId> = args.to_vec();
        self.reactor
            .rule([(node, Attr::Type), (node, Attr::Parent)])
            .using([(method, Attr::Parent)])
            .by(move |cx| {
                match cx.get(method, Attr::Parent) {
                    AttrValue::Node(parent) => {
                        cx.set(node, Attr::Parent, AttrValue::Node(parent));
                        let args_owned = args_owned.clone();
                        cx.rule([(node, Attr::Type)]).using([(parent, Attr::Type)]).by(move |cx| {
                            let Type::Fun(fun) = cx.get(parent, Attr::Type).as_type().clone() else {
                                unreachable!("methods have function types");
                            };
                            check_call_args(cx, node, &args_owned, fun.params.clone(), Some((*fun.ret).clone()));
                        });
                    }
                    _ => {
                        cx.error_for(
                            "Daddy call in a method that overrides no parent method".to_owned(),
                            node,
                            [(node, Attr::Type), (node, Attr::Parent)],
                        );
                    }
                }
            });
    }

    fn visit_assignment(&mut self, node: NodeId, lhs: NodeId, rhs: NodeId) {
        if !matches!(
            self.ast.kind(lhs),
            NodeKind::Reference { .. } | NodeKind::FieldAccess { .. } | NodeKind::ArrayAccess { .. }
        ) {
            self.report("Invalid assignment target", lhs);
        }
        self.visit(lhs);
        self.visit(rhs);
        self.reactor
            .rule([(node, Attr::Type)])
            .using([(lhs, Attr::Type), (rhs, Attr::Type)])
            .by(move |cx| {
                let target = cx.get(lhs, Attr::Type).as_type().clone();
                let source = cx.get(rhs, Attr::Type).as_type().clone();
                check_assign(
                    cx,
                    &source,
                    &target,
                    node,
                    format!("Trying to assign a value of type {source} to a non-compatible lvalue of type {target}"),
                );
                cx.set(node, Attr::Type, AttrValue::Type(target));
            });
    }

    fn visit_binary(&mut self, node: NodeId, op: BinaryOp, left: NodeId, right: NodeId) {
        self.visit(left);
        self.visit(right);
        self.reactor
            .rule([(node, Attr::Type)])
            .using([(left, Attr::Type), (right, Attr::Type)])
            .by(move |cx| {
                let lt = cx.get(left, Attr::Type).as_type().clone();
                let rt = cx.get(right, Attr::Type).as_type().clone();
                // unborn operands stand in for their payload
                let le = lt.unwrap_unborn().clone();
                let re = rt.unwrap_unborn().clone();

                if op == BinaryOp::Add && (le == Type::String || re == Type::String) {
                    cx.set(node, Attr::Type, AttrValue::Type(Type::String));
                    return;
                }
                if op == BinaryOp::Ciblings {
                    if matches!(le, Type::Class(_)) && matches!(re, Type::Class(_)) {
                        cx.set(node, Attr::Type, AttrValue::Type(Type::Bool));
                    } else {
                        cx.error_for(
                            format!("{op} requires class instances, got {lt} and {rt}"),
                            node,
                            [(node, Attr::Type)],
                        );
                    }
                    return;
                }
                if op.is_arithmetic() {
                    if le.is_numeric() && re.is_numeric() {
                        let ty = if le == Type::Float || re == Type::Float {
                            Type::Float
                        } else {
                            Type::Int
                        };
                        cx.set(node, Attr::Type, AttrValue::Type(ty));
                    } else {
                        cx.error_for(
                            format!("Arithmetic `{op}` on non-numeric types {lt} and {rt}"),
                            node,
                            [(node, Attr::Type)],
                        );
                    }
                    return;
                }
                if op.is_comparison() {
                    if le.is_numeric() && re.is_numeric() {
                        cx.set(node, Attr::Type, AttrValue::Type(Type::Bool));
                    } else {
                        cx.error_for(
                            format!("Comparison `{op}` on non-numeric types {lt} and {rt}"),
                            node,
                            [(node, Attr::Type)],
                        );
                    }
                    return;
                }
                if op.is_equality() {
                    if lt.comparable_with(&rt) {
                        cx.set(node, Attr::Type, AttrValue::Type(Type::Bool));
                    } else {
                        cx.error_for(
                            format!("Trying to compare incomparable types {lt} and {rt}"),
                            node,
                            [(node, Attr::Type)],
                        );
                    }
                    return;
                }
                debug_assert!(op.is_logic());
                if le == Type::Bool && re == Type::Bool {
                    cx.set(node, Attr::Type, AttrValue::Type(Type::Bool));
                } else {
                    cx.error_for(
                        format!("Logic `{op}` on non-Bool types {lt} and {rt}"),
                        node,
                        [(node, Attr::Type)],
                    );
                }
            });
    }

    fn visit_simple_type(&mut self, node: NodeId, name: &str) {
        let scope = self.current_scope();
        let name = name.to_owned();
        self.reactor
            .rule([(node, Attr::Value)])
            .using([])
            .by(move |cx| {
                let Some((decl, _)) = cx.scopes.lookup(cx.ast, scope, &name) else {
                    cx.error_for(
                        format!("Could not resolve: {name}"),
                        node,
                        [(node, Attr::Value)],
                    );
                    return;
                };
                let is_type_decl = matches!(
                    cx.ast.kind(decl),
                    NodeKind::StructDecl { .. } | NodeKind::ClassDecl { .. }
                ) || matches!(
                    cx.ast.kind(decl),
                    NodeKind::Synthetic { builtin: Builtin::Int
                        | Builtin::Float
                        | Builtin::Bool
                        | Builtin::String
                        | Builtin::Void
                        | Builtin::Type
                        | Builtin::Auto }
                );
                if !is_type_decl {
                    cx.error_for(format!("Not a type: {name}"), node, [(node, Attr::Value)]);
                    return;
                }
                cx.rule([(node, Attr::Value)]).using([(decl, Attr::Declared)]).by(move |cx| {
                    let declared = cx.get(decl, Attr::Declared);
                    cx.set(node, Attr::Value, declared);
                });
            });
    }
}

/// The name a class member is registered under: a method named like its
/// class is the constructor.
fn member_name(ast: &Ast, class_name: &str, member: NodeId) -> String {
    let name = ast.decl_name(member);
    if matches!(ast.kind(member), NodeKind::FunDecl { .. }) && name == class_name {
        CONSTRUCTOR_NAME.to_owned()
    } else {
        name.to_owned()
    }
}

/// Types an empty array literal from a call parameter type.
fn set_empty_array_from_param(cx: &mut RuleCx<'_>, node: NodeId, param: Option<&Type>) {
    match param {
        Some(ty @ Type::Array(_)) => {
            let ty = ty.clone();
            cx.set(node, Attr::Type, AttrValue::Type(ty));
        }
        _ => cx.error_for(
            "Cannot infer the type of this empty array literal".to_owned(),
            node,
            [(node, Attr::Type)],
        ),
    }
}

/// Checks call arity and per-argument assignability, then publishes the
/// call's type when `result` is given.
fn check_call_args(cx: &mut RuleCx<'_>, node: NodeId, args: &[NodeId], params: Vec<Type>, result: Option<Type>) {
    if args.len() != params.len() {
        cx.error_for(
            format!("Wrong number of arguments: expected {}, got {}", params.len(), args.len()),
            node,
            [(node, Attr::Type)],
        );
        return;
    }
    let args: Vec<NodeId> = args.to_vec();
    let inputs: Vec<Slot> = args.iter().map(|&a| (a, Attr::Type)).collect();
    cx.rule(result.is_some().then_some((node, Attr::Type)))
        .using(inputs)
        .by(move |cx| {
            for (index, (&arg, param)) in args.iter().zip(&params).enumerate() {
                let arg_ty = cx.get(arg, Attr::Type).as_type().clone();
                check_assign(
                    cx,
                    &arg_ty,
                    param,
                    arg,
                    format!("Argument {} has type {arg_ty}, expected {param}", index + 1),
                );
            }
            if let Some(result) = result {
                cx.set(node, Attr::Type, AttrValue::Type(result));
            }
        });
}

/// Assignability check that knows about class shape compatibility.
///
/// Non-class pairs are decided immediately; two distinct classes defer to a
/// follow-up rule over both member maps so duck typing sees complete shapes.
fn check_assign(cx: &mut RuleCx<'_>, source: &Type, target: &Type, node: NodeId, msg: String) {
    if let (Type::Class(source_class), Type::Class(target_class)) = (source, target) {
        if source_class.decl == target_class.decl {
            return;
        }
        let (s, t) = (source_class.clone(), target_class.clone());
        cx.rule([])
            .using([(s.decl, Attr::Fields), (t.decl, Attr::Fields)])
            .by(move |cx| {
                let source_fields = cx.get(s.decl, Attr::Fields).as_fields().clone();
                let target_fields = cx.get(t.decl, Attr::Fields).as_fields().clone();
                if let Err(detail) = class_shape_compatible(&t.name, &target_fields, &s.name, &source_fields) {
                    cx.error(format!("{msg}: {detail}"), node);
                }
            });
        return;
    }
    if !source.assigns_to(target) {
        cx.error(msg, node);
    }
}
