use std::{
    sync::{Arc, Condvar, Mutex},
    thread,
};

use ahash::AHashMap;
use dashmap::DashMap;
use tracing::debug;

use crate::{
    analyze::{Analysis, MAIN_THREAD},
    ast::{Ast, BinaryOp, Builtin, NodeId, NodeKind, UnaryOp},
    errors::{RuntimeError, RuntimeErrorKind},
    io::PrintWriter,
    object::Object,
    storage::Frame,
    types::{class_shape_compatible, Type, CONSTRUCTOR_NAME},
    value::{lock, Instance, StructValue, UnbornHandle, Value, ValueMap},
};

/// Control flow signal unwinding out of `exec`/`eval`.
enum Unwind {
    /// A `return` travelling to the enclosing call (or to the program exit).
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Self::Error(err)
    }
}

type Flow<T> = Result<T, Unwind>;

/// Join handle substitute for an async function: `born` blocks on it, the
/// spawned thread marks it when the body (and instance refresh) finished.
#[derive(Default)]
struct JoinFlag {
    done: Mutex<bool>,
    ready: Condvar,
}

impl JoinFlag {
    fn mark(&self) {
        *lock(&self.done) = true;
        self.ready.notify_all();
    }

    fn wait(&self) {
        let mut done = lock(&self.done);
        while !*done {
            done = self.ready.wait(done).expect("join flag lock poisoned");
        }
    }
}

/// Shared interpreter state, borrowed by every execution thread.
struct Engine<'a> {
    ast: &'a Ast,
    analysis: &'a Analysis,
    writer: Mutex<&'a mut (dyn PrintWriter + Send)>,
    /// Thread-index keyed storage handoff for async launches.
    storages: DashMap<u64, Frame>,
    /// Return values recorded by async bodies, keyed by thread index.
    return_values: DashMap<u64, Value>,
    /// Outstanding async threads, keyed by function name.
    pool: Mutex<AHashMap<String, Arc<JoinFlag>>>,
    /// First failure seen on an async thread; surfaced after the main
    /// thread finishes.
    async_error: Mutex<Option<RuntimeError>>,
}

/// Runs the decorated AST.
///
/// Async functions execute on scoped OS threads; leaving the scope is the
/// end-of-program join of every thread the program never `born`ed.
pub(crate) fn interpret(
    ast: &Ast,
    analysis: &Analysis,
    print: &mut (dyn PrintWriter + Send),
) -> Result<Option<Object>, RuntimeError> {
    let engine = Engine {
        ast,
        analysis,
        writer: Mutex::new(print),
        storages: DashMap::new(),
        return_values: DashMap::new(),
        pool: Mutex::new(AHashMap::new()),
        async_error: Mutex::new(None),
    };
    let result = thread::scope(|scope| run_root(&engine, scope));
    let async_error = lock(&engine.async_error).take();
    match (result, async_error) {
        (Ok(value), None) => Ok(value.map(|v| Object::from_value(&v, ast))),
        (Ok(_), Some(err)) | (Err(err), _) => Err(err),
    }
}

fn run_root<'a, 'scope, 'env>(
    engine: &'scope Engine<'a>,
    scope: &'scope thread::Scope<'scope, 'env>,
) -> Result<Option<Value>, RuntimeError>
where
    'a: 'scope,
{
    let root_frame = Frame::new(engine.analysis.root_scope, None);
    engine.storages.insert(MAIN_THREAD, root_frame.clone());
    let mut cx = ExecCx {
        engine,
        scope,
        frame: root_frame,
    };
    let NodeKind::Root { statements } = engine.ast.kind(engine.ast.root) else {
        unreachable!("the parser always produces a Root node");
    };
    for &statement in statements {
        match cx.exec(statement) {
            Ok(()) => {}
            Err(Unwind::Return(value)) => return Ok(Some(value)),
            Err(Unwind::Error(err)) => return Err(err),
        }
    }
    Ok(None)
}

/// Either side of a numeric operation.
#[derive(Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

/// Per-thread execution context: the shared engine plus this thread's
/// current frame (the top of its storage chain).
struct ExecCx<'a, 'scope, 'env> {
    engine: &'scope Engine<'a>,
    scope: &'scope thread::Scope<'scope, 'env>,
    frame: Frame,
}

impl<'a: 'scope, 'scope, 'env> ExecCx<'a, 'scope, 'env> {
    fn err(&self, kind: RuntimeErrorKind, node: NodeId) -> Unwind {
        Unwind::Error(RuntimeError::new(kind, self.engine.ast.range(node)))
    }

    fn other(&self, msg: impl Into<String>, node: NodeId) -> Unwind {
        Unwind::Error(RuntimeError::other(msg, self.engine.ast.range(node)))
    }

    // --- statements ---

    fn exec(&mut self, node: NodeId) -> Flow<()> {
        match self.engine.ast.kind(node).clone() {
            NodeKind::Block { statements } => {
                let saved = self.frame.clone();
                self.frame = Frame::new(self.engine.analysis.node_scope(node), Some(saved.clone()));
                let result = statements.iter().try_for_each(|&s| self.exec(s));
                self.frame = saved;
                result
            }
            NodeKind::VarDecl { name, initializer, .. } => {
                let value = self.eval(initializer)?;
                let value = value.widen_to(self.engine.analysis.ty(node));
                self.frame.set(name, value);
                Ok(())
            }
            // declarations are resolved through their nodes; nothing to run
            NodeKind::FunDecl { .. } | NodeKind::StructDecl { .. } | NodeKind::ClassDecl { .. } => Ok(()),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let test = self.eval(condition)?;
                if self.expect_bool(test, condition)? {
                    self.exec(then_branch)
                } else if let Some(branch) = else_branch {
                    self.exec(branch)
                } else {
                    Ok(())
                }
            }
            NodeKind::While { condition, body } => {
                loop {
                    let test = self.eval(condition)?;
                    if !self.expect_bool(test, condition)? {
                        return Ok(());
                    }
                    self.exec(body)?;
                }
            }
            NodeKind::Return { value } => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::Null,
                };
                Err(Unwind::Return(value))
            }
            NodeKind::ExprStmt { expr } => {
                self.eval(expr)?;
                Ok(())
            }
            NodeKind::Born { fun_ref, var_ref } => self.exec_born(node, fun_ref, var_ref),
            other => unreachable!("not a statement: {other:?}"),
        }
    }

    fn exec_born(&mut self, node: NodeId, fun_ref: NodeId, var_ref: Option<NodeId>) -> Flow<()> {
        let decl = self.engine.analysis.decl(fun_ref);
        let (fun, from_var) = match self.engine.ast.kind(decl) {
            NodeKind::FunDecl { .. } => (decl, None),
            NodeKind::VarDecl { .. } | NodeKind::Param { .. } => match self.eval(fun_ref)? {
                Value::Unborn(handle) => (handle.fun, Some(fun_ref)),
                _ => return Err(self.err(RuntimeErrorKind::BornBeforeCall, node)),
            },
            _ => return Err(self.other("born expects an async function", node)),
        };

        let flag = lock(&self.engine.pool).get(self.engine.ast.decl_name(fun)).cloned();
        let Some(flag) = flag else {
            return Err(self.err(RuntimeErrorKind::BornBeforeCall, node));
        };
        flag.wait();

        let thread_index = self.engine.analysis.thread_index(fun);
        let result = self.engine.return_values.get(&thread_index).map(|entry| entry.value().clone());

        if let Some(var_ref) = var_ref {
            let target_decl = self.engine.analysis.decl(var_ref);
            let value = result
                .clone()
                .unwrap_or(Value::Null)
                .widen_to(self.engine.analysis.ty(target_decl));
            self.store_reference(var_ref, value)?;
        }
        // an unborn-typed variable also receives the value it was waiting on
        if let (Some(var), Some(value)) = (from_var, result) {
            self.store_reference(var, value)?;
        }
        Ok(())
    }

    /// Writes a value into the storage slot a reference resolved to.
    fn store_reference(&mut self, reference: NodeId, value: Value) -> Flow<()> {
        let NodeKind::Reference { name } = self.engine.ast.kind(reference) else {
            return Err(self.other("expected a variable reference", reference));
        };
        let target = self.engine.analysis.ref_scope(reference);
        let frame = self
            .frame
            .resolve(target, self.engine.ast, &self.engine.analysis.scopes)
            .ok_or_else(|| self.other(format!("no storage holds variable `{name}`"), reference))?;
        frame.set(name.clone(), value);
        Ok(())
    }

    // --- expressions ---

    fn eval(&mut self, node: NodeId) -> Flow<Value> {
        match self.engine.ast.kind(node).clone() {
            NodeKind::IntLiteral(value) => Ok(Value::Int(value)),
            NodeKind::FloatLiteral(value) => Ok(Value::Float(value)),
            NodeKind::StringLiteral(value) => Ok(Value::str(value)),
            NodeKind::Reference { name } => self.eval_reference(node, &name),
            NodeKind::Constructor { reference } => {
                let decl = self.engine.analysis.decl(reference);
                Ok(Value::Constructor(decl))
            }
            NodeKind::ArrayLiteral { elements } => {
                let element_ty = match self.engine.analysis.ty(node) {
                    Type::Array(element) => (**element).clone(),
                    _ => Type::Auto,
                };
                let mut values = Vec::with_capacity(elements.len());
                for &element in &elements {
                    values.push(self.eval(element)?.widen_to(&element_ty));
                }
                Ok(Value::array(values))
            }
            NodeKind::ArrayAccess { array, index } => {
                let array_value = self.eval(array)?;
                let index_value = self.eval(index)?;
                let elements = match &array_value {
                    Value::Array(elements) => elements,
                    Value::Null => return Err(self.err(RuntimeErrorKind::NullPointer("array access on null".to_owned()), node)),
                    other => return Err(self.other(format!("indexing a non-array value `{}`", other.render(self.engine.ast)), node)),
                };
                let index_value = self.expect_int(index_value, index)?;
                let elements = lock(elements);
                self.array_index(index_value, elements.len(), node)
                    .map(|i| elements[i].clone())
            }
            NodeKind::FieldAccess { stem, field } => self.eval_field_access(node, stem, &field),
            NodeKind::FunCall { callee, args } => self.eval_call(node, callee, &args),
            NodeKind::DaddyCall { args } => self.eval_daddy_call(node, &args),
            NodeKind::Assignment { lhs, rhs } => self.eval_assignment(node, lhs, rhs),
            NodeKind::Binary { op, left, right } => self.eval_binary(node, op, left, right),
            NodeKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => {
                        let value = self.expect_bool(value, operand)?;
                        Ok(Value::Bool(!value))
                    }
                    UnaryOp::Neg => match self.to_num(value, operand)? {
                        Num::I(v) => v
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| self.err(RuntimeErrorKind::IntegerOverflow, node)),
                        Num::F(v) => Ok(Value::Float(-v)),
                    },
                }
            }
            other => unreachable!("not an expression: {other:?}"),
        }
    }

    fn eval_reference(&mut self, node: NodeId, name: &str) -> Flow<Value> {
        let decl = self.engine.analysis.decl(node);
        match self.engine.ast.kind(decl) {
            NodeKind::VarDecl { .. } | NodeKind::Param { .. } | NodeKind::FieldDecl { .. } => {
                let target = self.engine.analysis.ref_scope(node);
                let frame = self
                    .frame
                    .resolve(target, self.engine.ast, &self.engine.analysis.scopes)
                    .ok_or_else(|| self.other(format!("no storage holds variable `{name}`"), node))?;
                frame
                    .get(name)
                    .ok_or_else(|| self.other(format!("variable `{name}` read before initialization"), node))
            }
            NodeKind::FunDecl { .. } => Ok(Value::Fun(decl)),
            NodeKind::StructDecl { .. } | NodeKind::ClassDecl { .. } => Ok(Value::TypeValue(decl)),
            NodeKind::Synthetic { builtin } => Ok(match builtin {
                Builtin::Print => Value::BuiltinFun(*builtin),
                Builtin::True => Value::Bool(true),
                Builtin::False => Value::Bool(false),
                Builtin::Null => Value::Null,
                _ => Value::TypeValue(decl),
            }),
            other => unreachable!("reference resolved to a non-declaration: {other:?}"),
        }
    }

    fn eval_field_access(&mut self, node: NodeId, stem: NodeId, field: &str) -> Flow<Value> {
        let stem_value = self.eval(stem)?;
        match stem_value {
            Value::Null => Err(self.err(
                RuntimeErrorKind::NullPointer(format!("field access `{field}` on null")),
                node,
            )),
            Value::Array(elements) => {
                debug_assert_eq!(field, "length");
                let len = lock(&elements).len();
                Ok(Value::Int(len as i64))
            }
            Value::Struct(record) => lock(&record.fields)
                .get(field)
                .cloned()
                .ok_or_else(|| self.other(format!("struct `{}` has no field `{field}`", record.name), node)),
            Value::Instance(instance) => {
                if let Some(value) = lock(&instance.fields).get(field) {
                    return Ok(value.clone());
                }
                // a method read as a value
                match self
                    .engine
                    .analysis
                    .scopes
                    .lookup_member(self.engine.ast, instance.class, field)
                {
                    Some((member, _)) if matches!(self.engine.ast.kind(member), NodeKind::FunDecl { .. }) => {
                        Ok(Value::Fun(member))
                    }
                    _ => Err(self.other(
                        format!(
                            "class `{}` has no member `{field}`",
                            self.engine.ast.decl_name(instance.class)
                        ),
                        node,
                    )),
                }
            }
            other => Err(self.other(
                format!("field access on a non-object value `{}`", other.render(self.engine.ast)),
                node,
            )),
        }
    }

    fn eval_call(&mut self, node: NodeId, callee: NodeId, args: &[NodeId]) -> Flow<Value> {
        // `instance.method(...)` runs against the instance's class frame
        if let NodeKind::FieldAccess { stem, field } = self.engine.ast.kind(callee).clone() {
            return self.call_method(node, stem, &field, args);
        }

        let callee_value = self.eval(callee)?;
        let mut arg_values = Vec::with_capacity(args.len());
        for &arg in args {
            arg_values.push(self.eval(arg)?);
        }

        match callee_value {
            Value::BuiltinFun(Builtin::Print) => {
                let value = arg_values.into_iter().next().unwrap_or(Value::Null);
                let text = value.render(self.engine.ast);
                let mut writer = lock(&self.engine.writer);
                writer.write(&text);
                writer.push('\n');
                Ok(value)
            }
            Value::Fun(decl) => self.call_function(decl, arg_values),
            Value::Constructor(decl) => self.construct_struct(decl, arg_values),
            Value::TypeValue(decl) if matches!(self.engine.ast.kind(decl), NodeKind::ClassDecl { .. }) => {
                self.construct_instance(decl, arg_values)
            }
            Value::Null => Err(self.err(RuntimeErrorKind::CallingNull, node)),
            Value::Unborn(_) => Err(self.other("calling an unborn value", node)),
            other => Err(self.other(
                format!("calling a non-function value `{}`", other.render(self.engine.ast)),
                node,
            )),
        }
    }

    /// Ordinary call: push the callee frame on this thread's chain, bind
    /// parameters, run the body, restore. Async callees launch instead.
    fn call_function(&mut self, decl: NodeId, args: Vec<Value>) -> Flow<Value> {
        let frame = Frame::new(self.engine.analysis.node_scope(decl), Some(self.frame.clone()));
        self.bind_params(&frame, decl, args);
        if self.is_async(decl) {
            return self.spawn_async(decl, frame, None);
        }
        let body = self.fun_body(decl);
        let saved = std::mem::replace(&mut self.frame, frame);
        let result = self.exec(body);
        self.frame = saved;
        match result {
            Ok(()) => Ok(Value::Null),
            Err(Unwind::Return(value)) => Ok(value),
            Err(err) => Err(err),
        }
    }

    /// Method call through field access: class frame prefilled from
    /// the instance, method frame on top, instance refreshed on completion.
    /// The call's own value is discarded.
    fn call_method(&mut self, node: NodeId, stem: NodeId, field: &str, args: &[NodeId]) -> Flow<Value> {
        let stem_value = self.eval(stem)?;
        let instance = match stem_value {
            Value::Instance(instance) => instance,
            Value::Null => {
                return Err(self.err(
                    RuntimeErrorKind::NullPointer(format!("method call `{field}` on null")),
                    node,
                ));
            }
            other => {
                return Err(self.other(
                    format!("method call on a non-instance value `{}`", other.render(self.engine.ast)),
                    node,
                ));
            }
        };
        let method = match self
            .engine
            .analysis
            .scopes
            .lookup_member(self.engine.ast, instance.class, field)
        {
            Some((member, _)) if matches!(self.engine.ast.kind(member), NodeKind::FunDecl { .. }) => member,
            _ => {
                return Err(self.other(
                    format!(
                        "class `{}` has no method `{field}`",
                        self.engine.ast.decl_name(instance.class)
                    ),
                    node,
                ));
            }
        };
        let mut arg_values = Vec::with_capacity(args.len());
        for &arg in args {
            arg_values.push(self.eval(arg)?);
        }

        let class_scope = self
            .engine
            .analysis
            .scopes
            .class_scope(instance.class)
            .expect("class declarations always register a scope");
        let class_frame = Frame::new(class_scope, Some(self.frame.clone()));
        for (name, value) in lock(&instance.fields).iter() {
            class_frame.set(name.clone(), value.clone());
        }
        let method_frame = Frame::new(self.engine.analysis.node_scope(method), Some(class_frame.clone()));
        self.bind_params(&method_frame, method, arg_values);

        if self.is_async(method) {
            self.spawn_async(method, method_frame, Some((instance, class_frame)))?;
            return Ok(Value::Null);
        }

        let body = self.fun_body(method);
        let saved = std::mem::replace(&mut self.frame, method_frame);
        let result = self.exec(body);
        self.frame = saved;
        refresh_instance(&instance, &class_frame);
        match result {
            Ok(()) | Err(Unwind::Return(_)) => Ok(Value::Null),
            Err(err) => Err(err),
        }
    }

    /// Class construction.
    fn construct_instance(&mut self, class_decl: NodeId, args: Vec<Value>) -> Flow<Value> {
        let scopes = &self.engine.analysis.scopes;
        let class_scope = scopes
            .class_scope(class_decl)
            .expect("class declarations always register a scope");
        let class_frame = Frame::new(class_scope, Some(self.frame.clone()));
        let ctor = scopes
            .lookup_member(self.engine.ast, class_decl, CONSTRUCTOR_NAME)
            .map(|(decl, _)| decl)
            .expect("analysis guarantees every class a constructor");
        let ctor_frame = Frame::new(self.engine.analysis.node_scope(ctor), Some(class_frame.clone()));
        let instance = Arc::new(Instance {
            class: class_decl,
            fields: Mutex::new(ValueMap::default()),
        });

        // field initializers run in the class scope, ancestors first
        let fields = self.engine.analysis.class_fields(class_decl).clone();
        let saved = std::mem::replace(&mut self.frame, class_frame.clone());
        for (name, ty) in fields.iter() {
            if name == CONSTRUCTOR_NAME {
                continue;
            }
            let Some((member, _)) = self
                .engine
                .analysis
                .scopes
                .lookup_member(self.engine.ast, class_decl, name)
            else {
                continue;
            };
            let NodeKind::VarDecl { initializer, .. } = self.engine.ast.kind(member) else {
                continue;
            };
            match self.eval(*initializer) {
                Ok(value) => {
                    let value = value.widen_to(ty);
                    lock(&instance.fields).insert(name.clone(), value.clone());
                    class_frame.set(name.clone(), value);
                }
                Err(err) => {
                    self.frame = saved;
                    return Err(err);
                }
            }
        }

        self.bind_params(&ctor_frame, ctor, args);
        let body = self.fun_body(ctor);
        self.frame = ctor_frame.clone();
        let result = self.exec(body);
        self.frame = saved;
        // a Return signal is permitted in a constructor
        if let Err(Unwind::Error(err)) = result {
            return Err(Unwind::Error(err));
        }
        // the first class-scope frame on the chain below the constructor
        // refreshes the instance
        let refresh_frame = ctor_frame
            .innermost_class_frame(scopes)
            .expect("the constructor frame sits on the class frame");
        refresh_instance(&instance, &refresh_frame);
        Ok(Value::Instance(instance))
    }

    fn construct_struct(&mut self, struct_decl: NodeId, args: Vec<Value>) -> Flow<Value> {
        let NodeKind::StructDecl { name, fields } = self.engine.ast.kind(struct_decl) else {
            unreachable!("constructor values wrap struct declarations");
        };
        let mut map = ValueMap::default();
        for (&field, value) in fields.iter().zip(args) {
            let field_name = self.engine.ast.decl_name(field).to_owned();
            let value = value.widen_to(self.engine.analysis.ty(field));
            map.insert(field_name, value);
        }
        Ok(Value::Struct(Arc::new(StructValue {
            name: name.clone(),
            fields: Mutex::new(map),
        })))
    }

    /// `Daddy(...)`: run the overridden parent method against the class
    /// frame that is live at the call site.
    fn eval_daddy_call(&mut self, node: NodeId, args: &[NodeId]) -> Flow<Value> {
        let parent = self
            .engine
            .analysis
            .parent_method(node)
            .expect("analysis resolved the Daddy target");
        let mut arg_values = Vec::with_capacity(args.len());
        for &arg in args {
            arg_values.push(self.eval(arg)?);
        }
        let frame = Frame::new(self.engine.analysis.node_scope(parent), Some(self.frame.clone()));
        self.bind_params(&frame, parent, arg_values);
        let body = self.fun_body(parent);
        let saved = std::mem::replace(&mut self.frame, frame);
        let result = self.exec(body);
        self.frame = saved;
        match result {
            Ok(()) => Ok(Value::Null),
            Err(Unwind::Return(value)) => Ok(value),
            Err(err) => Err(err),
        }
    }

    /// Launches an async function on its own OS thread: the frame is
    /// registered under the function's thread index, the thread recorded in
    /// the pool by name, and the caller continues immediately.
    fn spawn_async(
        &mut self,
        fun: NodeId,
        frame: Frame,
        refresh: Option<(Arc<Instance>, Frame)>,
    ) -> Flow<Value> {
        let thread_index = self.engine.analysis.thread_index(fun);
        let name = self.engine.ast.decl_name(fun).to_owned();
        debug!(function = %name, thread_index, "launching async function");
        self.engine.storages.insert(thread_index, frame.clone());
        let flag = Arc::new(JoinFlag::default());
        lock(&self.engine.pool).insert(name, flag.clone());

        let engine = self.engine;
        let scope = self.scope;
        let body = self.fun_body(fun);
        scope.spawn(move || {
            let mut cx = ExecCx {
                engine,
                scope,
                frame,
            };
            match cx.exec(body) {
                Ok(()) => {}
                Err(Unwind::Return(value)) => {
                    engine.return_values.insert(thread_index, value);
                }
                Err(Unwind::Error(err)) => {
                    let mut slot = lock(&engine.async_error);
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                }
            }
            // an async method refreshes its instance during its own cleanup
            if let Some((instance, class_frame)) = refresh {
                refresh_instance(&instance, &class_frame);
            }
            flag.mark();
        });

        Ok(Value::Unborn(UnbornHandle {
            fun,
            thread: thread_index,
        }))
    }

    fn eval_assignment(&mut self, node: NodeId, lhs: NodeId, rhs: NodeId) -> Flow<Value> {
        let rhs_value = self.eval(rhs)?;
        let value = rhs_value.widen_to(self.engine.analysis.ty(lhs));
        match self.engine.ast.kind(lhs).clone() {
            NodeKind::Reference { .. } => {
                self.store_reference(lhs, value.clone())?;
                Ok(value)
            }
            NodeKind::FieldAccess { stem, field } => {
                let stem_value = self.eval(stem)?;
                match stem_value {
                    Value::Instance(instance) => {
                        lock(&instance.fields).insert(field, value.clone());
                        Ok(value)
                    }
                    Value::Struct(record) => {
                        lock(&record.fields).insert(field, value.clone());
                        Ok(value)
                    }
                    Value::Null => Err(self.err(
                        RuntimeErrorKind::NullPointer(format!("field assignment `{field}` on null")),
                        node,
                    )),
                    other => Err(self.other(
                        format!("field assignment on a non-object value `{}`", other.render(self.engine.ast)),
                        node,
                    )),
                }
            }
            NodeKind::ArrayAccess { array, index } => {
                let array_value = self.eval(array)?;
                let index_value = self.eval(index)?;
                let elements = match &array_value {
                    Value::Array(elements) => elements,
                    Value::Null => {
                        return Err(self.err(
                            RuntimeErrorKind::NullPointer("array assignment on null".to_owned()),
                            node,
                        ));
                    }
                    other => {
                        return Err(self.other(
                            format!("indexing a non-array value `{}`", other.render(self.engine.ast)),
                            node,
                        ));
                    }
                };
                let index_value = self.expect_int(index_value, index)?;
                let mut elements = lock(elements);
                let slot = self.array_index(index_value, elements.len(), node)?;
                elements[slot] = value.clone();
                Ok(value)
            }
            _ => Err(self.other("invalid assignment target", lhs)),
        }
    }

    fn eval_binary(&mut self, node: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> Flow<Value> {
        // logic operators short-circuit
        if op == BinaryOp::And {
            let l = self.eval(left)?;
            if !self.expect_bool(l, left)? {
                return Ok(Value::Bool(false));
            }
            let r = self.eval(right)?;
            return Ok(Value::Bool(self.expect_bool(r, right)?));
        }
        if op == BinaryOp::Or {
            let l = self.eval(left)?;
            if self.expect_bool(l, left)? {
                return Ok(Value::Bool(true));
            }
            let r = self.eval(right)?;
            return Ok(Value::Bool(self.expect_bool(r, right)?));
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;

        if op == BinaryOp::Add && (matches!(l, Value::Str(_)) || matches!(r, Value::Str(_))) {
            let text = format!("{}{}", l.render(self.engine.ast), r.render(self.engine.ast));
            return Ok(Value::str(text));
        }
        if op.is_equality() {
            let equal = l.equals(&r);
            return Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }));
        }
        if op == BinaryOp::Ciblings {
            return self.ciblings(node, &l, &r);
        }

        let ln = self.to_num(l, left)?;
        let rn = self.to_num(r, right)?;
        if op.is_comparison() {
            let (a, b) = match (ln, rn) {
                (Num::I(a), Num::I(b)) => {
                    return Ok(Value::Bool(match op {
                        BinaryOp::Lt => a < b,
                        BinaryOp::LtEq => a <= b,
                        BinaryOp::Gt => a > b,
                        _ => a >= b,
                    }));
                }
                (Num::I(a), Num::F(b)) => (a as f64, b),
                (Num::F(a), Num::I(b)) => (a, b as f64),
                (Num::F(a), Num::F(b)) => (a, b),
            };
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::LtEq => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }));
        }

        debug_assert!(op.is_arithmetic());
        match (ln, rn) {
            (Num::I(a), Num::I(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => {
                        if b == 0 {
                            return Err(self.err(RuntimeErrorKind::DivisionByZero, node));
                        }
                        a.checked_div(b)
                    }
                    _ => {
                        if b == 0 {
                            return Err(self.err(RuntimeErrorKind::DivisionByZero, node));
                        }
                        a.checked_rem(b)
                    }
                };
                result
                    .map(Value::Int)
                    .ok_or_else(|| self.err(RuntimeErrorKind::IntegerOverflow, node))
            }
            (ln, rn) => {
                let a = match ln {
                    Num::I(v) => v as f64,
                    Num::F(v) => v,
                };
                let b = match rn {
                    Num::I(v) => v as f64,
                    Num::F(v) => v,
                };
                Ok(Value::Float(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
        }
    }

    /// `a ciblingsOf b`: the two instances' classes are shape-compatible in
    /// both directions.
    fn ciblings(&self, node: NodeId, l: &Value, r: &Value) -> Flow<Value> {
        let (a, b) = match (l, r) {
            (Value::Instance(a), Value::Instance(b)) => (a, b),
            (Value::Null, _) | (_, Value::Null) => {
                return Err(self.err(
                    RuntimeErrorKind::NullPointer("ciblingsOf on null".to_owned()),
                    node,
                ));
            }
            _ => return Err(self.other("ciblingsOf requires class instances", node)),
        };
        let a_fields = self.engine.analysis.class_fields(a.class);
        let b_fields = self.engine.analysis.class_fields(b.class);
        let a_name = self.engine.ast.decl_name(a.class);
        let b_name = self.engine.ast.decl_name(b.class);
        let compatible = class_shape_compatible(a_name, a_fields, b_name, b_fields).is_ok()
            && class_shape_compatible(b_name, b_fields, a_name, a_fields).is_ok();
        Ok(Value::Bool(compatible))
    }

    // --- helpers ---

    fn is_async(&self, fun: NodeId) -> bool {
        matches!(self.engine.analysis.ty(fun), Type::Fun(f) if matches!(*f.ret, Type::Unborn(_)))
    }

    fn fun_body(&self, fun: NodeId) -> NodeId {
        match self.engine.ast.kind(fun) {
            NodeKind::FunDecl { body, .. } => *body,
            other => unreachable!("not a function declaration: {other:?}"),
        }
    }

    fn bind_params(&self, frame: &Frame, fun: NodeId, args: Vec<Value>) {
        let NodeKind::FunDecl { params, .. } = self.engine.ast.kind(fun) else {
            unreachable!("binding parameters of a non-function");
        };
        for (&param, value) in params.iter().zip(args) {
            let name = self.engine.ast.decl_name(param).to_owned();
            frame.set(name, value.widen_to(self.engine.analysis.ty(param)));
        }
    }

    fn array_index(&self, index: i64, len: usize, node: NodeId) -> Flow<usize> {
        if index < 0 {
            return Err(self.err(RuntimeErrorKind::NegativeIndex(index), node));
        }
        let slot = index as usize;
        if slot >= len {
            return Err(self.err(RuntimeErrorKind::IndexOutOfBounds { index, len }, node));
        }
        Ok(slot)
    }

    fn expect_bool(&self, value: Value, node: NodeId) -> Flow<bool> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(self.other(
                format!("expected a Bool, got `{}`", other.render(self.engine.ast)),
                node,
            )),
        }
    }

    fn expect_int(&self, value: Value, node: NodeId) -> Flow<i64> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(self.other(
                format!("expected an Int, got `{}`", other.render(self.engine.ast)),
                node,
            )),
        }
    }

    fn to_num(&self, value: Value, node: NodeId) -> Flow<Num> {
        match value {
            Value::Int(v) => Ok(Num::I(v)),
            Value::Float(v) => Ok(Num::F(v)),
            Value::Null => Err(self.err(
                RuntimeErrorKind::NullPointer("arithmetic on null".to_owned()),
                node,
            )),
            other => Err(self.other(
                format!("expected a number, got `{}`", other.render(self.engine.ast)),
                node,
            )),
        }
    }
}

/// Copies the class frame's slots back into the instance on call cleanup.
fn refresh_instance(instance: &Instance, class_frame: &Frame) {
    let entries = class_frame.entries();
    let mut fields = lock(&instance.fields);
    for (name, value) in entries {
        if fields.contains_key(&name) {
            fields.insert(name, value);
        }
    }
}
