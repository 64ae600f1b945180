use ahash::{AHashMap, AHashSet};

use crate::ast::{Ast, NodeId, NodeKind};

/// Index of a scope inside the [`Scopes`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ScopeId(u32);

impl ScopeId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("scope arena too large for u32 ids"))
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Ordinary,
    /// A class body. Lookup walks the inheritance chain before falling
    /// through to the lexical parent.
    Class,
}

#[derive(Debug)]
pub struct ScopeData {
    /// The AST node that introduced this scope (root, block, function or
    /// class declaration).
    pub node: NodeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    decls: AHashMap<String, NodeId>,
}

impl ScopeData {
    /// The declaration registered under `name` in this scope alone.
    #[must_use]
    pub fn local(&self, name: &str) -> Option<NodeId> {
        self.decls.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = (&String, &NodeId)> {
        self.decls.iter()
    }
}

/// The scope tree plus the shared registry of class scopes.
///
/// Scopes are arena records addressed by [`ScopeId`]; the registry maps a
/// class declaration node to its scope, which is how inheritance lookup
/// jumps between classes.
#[derive(Debug, Default)]
pub struct Scopes {
    arena: Vec<ScopeData>,
    registry: AHashMap<NodeId, ScopeId>,
}

impl Scopes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope; a class scope installs itself in the registry under
    /// its declaration node.
    pub fn new_scope(&mut self, node: NodeId, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = ScopeId::new(self.arena.len());
        self.arena.push(ScopeData {
            node,
            parent,
            kind,
            decls: AHashMap::new(),
        });
        if kind == ScopeKind::Class {
            self.registry.insert(node, id);
        }
        id
    }

    pub fn declare(&mut self, scope: ScopeId, name: impl Into<String>, decl: NodeId) {
        self.arena[scope.index()].decls.insert(name.into(), decl);
    }

    #[must_use]
    pub fn get(&self, scope: ScopeId) -> &ScopeData {
        &self.arena[scope.index()]
    }

    /// The scope of a class declaration, from the registry.
    #[must_use]
    pub fn class_scope(&self, class_decl: NodeId) -> Option<ScopeId> {
        self.registry.get(&class_decl).copied()
    }

    /// Resolves `name` starting at `scope`.
    ///
    /// Ordinary scopes check their own map and then recurse to the parent.
    /// A class scope first walks its inheritance chain (following parent
    /// *names*, cycle-safe) and only then falls through to the lexical
    /// parent of the class declaration.
    #[must_use]
    pub fn lookup(&self, ast: &Ast, scope: ScopeId, name: &str) -> Option<(NodeId, ScopeId)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = self.get(id);
            match data.kind {
                ScopeKind::Ordinary => {
                    if let Some(decl) = data.local(name) {
                        return Some((decl, id));
                    }
                }
                ScopeKind::Class => {
                    if let Some(found) = self.class_lookup(ast, id, name) {
                        return Some(found);
                    }
                }
            }
            current = data.parent;
        }
        None
    }

    /// Resolves a member of a class (fields, methods, `<constructor>`)
    /// honoring inheritance, without falling through to lexical scopes.
    #[must_use]
    pub fn lookup_member(&self, ast: &Ast, class_decl: NodeId, name: &str) -> Option<(NodeId, ScopeId)> {
        let scope = self.class_scope(class_decl)?;
        self.class_lookup(ast, scope, name)
    }

    /// Searches a class scope and then its ancestors for `name`.
    fn class_lookup(&self, ast: &Ast, class_scope: ScopeId, name: &str) -> Option<(NodeId, ScopeId)> {
        let mut visited = AHashSet::new();
        let mut current_decl = self.get(class_scope).node;
        loop {
            if !visited.insert(current_decl) {
                // inheritance cycle; reported separately by the analyzer
                return None;
            }
            let scope_id = self.class_scope(current_decl)?;
            let data = self.get(scope_id);
            if let Some(decl) = data.local(name) {
                return Some((decl, scope_id));
            }
            let parent_name = match ast.kind(current_decl) {
                NodeKind::ClassDecl { parent, .. } => parent.as_deref()?,
                _ => return None,
            };
            current_decl = self.resolve_class_name(ast, scope_id, parent_name)?;
        }
    }

    /// Resolves an ancestor class *name* lexically from a class scope,
    /// without re-entering inheritance lookup.
    fn resolve_class_name(&self, ast: &Ast, from: ScopeId, name: &str) -> Option<NodeId> {
        let mut current = self.get(from).parent;
        while let Some(id) = current {
            let data = self.get(id);
            if let Some(decl) = data.local(name) {
                return matches!(ast.kind(decl), NodeKind::ClassDecl { .. }).then_some(decl);
            }
            current = data.parent;
        }
        None
    }

    /// True when `decl` is among the class-decl ancestors of `class_decl`
    /// (including itself). Used by the interpreter to match storage frames
    /// of subclasses against references resolved in ancestor scopes.
    #[must_use]
    pub fn class_inherits(&self, ast: &Ast, class_decl: NodeId, decl: NodeId) -> bool {
        let mut visited = AHashSet::new();
        let mut current = class_decl;
        loop {
            if current == decl {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            let Some(scope_id) = self.class_scope(current) else {
                return false;
            };
            let parent_name = match ast.kind(current) {
                NodeKind::ClassDecl { parent, .. } => match parent.as_deref() {
                    Some(p) => p,
                    None => return false,
                },
                _ => return false,
            };
            match self.resolve_class_name(ast, scope_id, parent_name) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CodeRange, NodeKind};

    /// Builds an AST holding two class declarations, `Base` and
    /// `Derived sonOf Base`, plus a root scope declaring both.
    fn class_fixture() -> (Ast, Scopes, ScopeId, ScopeId, ScopeId, NodeId, NodeId) {
        let mut ast = Ast::new(vec![], NodeId::new(0));
        let root = ast.push(CodeRange::default(), NodeKind::Root { statements: vec![] });
        let base = ast.push(
            CodeRange::default(),
            NodeKind::ClassDecl {
                name: "Base".to_owned(),
                parent: None,
                members: vec![],
            },
        );
        let derived = ast.push(
            CodeRange::default(),
            NodeKind::ClassDecl {
                name: "Derived".to_owned(),
                parent: Some("Base".to_owned()),
                members: vec![],
            },
        );
        let field = ast.push(
            CodeRange::default(),
            NodeKind::VarDecl {
                name: "a".to_owned(),
                declared_type: root,
                initializer: root,
            },
        );

        let mut scopes = Scopes::new();
        let root_scope = scopes.new_scope(root, None, ScopeKind::Ordinary);
        scopes.declare(root_scope, "Base", base);
        scopes.declare(root_scope, "Derived", derived);
        let base_scope = scopes.new_scope(base, Some(root_scope), ScopeKind::Class);
        scopes.declare(base_scope, "a", field);
        let derived_scope = scopes.new_scope(derived, Some(root_scope), ScopeKind::Class);

        (ast, scopes, root_scope, base_scope, derived_scope, base, field)
    }

    #[test]
    fn ordinary_lookup_walks_parents() {
        let (ast, scopes, root_scope, ..) = class_fixture();
        let mut scopes = scopes;
        let block_scope = scopes.new_scope(NodeId::new(0), Some(root_scope), ScopeKind::Ordinary);
        let (decl, found_in) = scopes.lookup(&ast, block_scope, "Base").unwrap();
        assert_eq!(found_in, root_scope);
        assert!(matches!(ast.kind(decl), NodeKind::ClassDecl { .. }));
    }

    #[test]
    fn class_lookup_follows_inheritance() {
        let (ast, scopes, _, base_scope, derived_scope, _, field) = class_fixture();
        let (decl, found_in) = scopes.lookup(&ast, derived_scope, "a").unwrap();
        assert_eq!(decl, field);
        assert_eq!(found_in, base_scope);
    }

    #[test]
    fn class_lookup_falls_through_to_lexical_parent() {
        let (ast, scopes, root_scope, _, derived_scope, ..) = class_fixture();
        let (_, found_in) = scopes.lookup(&ast, derived_scope, "Derived").unwrap();
        assert_eq!(found_in, root_scope);
    }

    #[test]
    fn inheritance_cycles_do_not_hang_lookup() {
        let mut ast = Ast::new(vec![], NodeId::new(0));
        let root = ast.push(CodeRange::default(), NodeKind::Root { statements: vec![] });
        let a = ast.push(
            CodeRange::default(),
            NodeKind::ClassDecl {
                name: "A".to_owned(),
                parent: Some("B".to_owned()),
                members: vec![],
            },
        );
        let b = ast.push(
            CodeRange::default(),
            NodeKind::ClassDecl {
                name: "B".to_owned(),
                parent: Some("A".to_owned()),
                members: vec![],
            },
        );
        let mut scopes = Scopes::new();
        let root_scope = scopes.new_scope(root, None, ScopeKind::Ordinary);
        scopes.declare(root_scope, "A", a);
        scopes.declare(root_scope, "B", b);
        let a_scope = scopes.new_scope(a, Some(root_scope), ScopeKind::Class);
        scopes.new_scope(b, Some(root_scope), ScopeKind::Class);

        assert!(scopes.lookup(&ast, a_scope, "missing").is_none());
    }

    #[test]
    fn class_inherits_includes_self_and_ancestors() {
        let (ast, scopes, _, _, _, base, _) = class_fixture();
        let derived = NodeId::new(2);
        assert!(scopes.class_inherits(&ast, derived, derived));
        assert!(scopes.class_inherits(&ast, derived, base));
        assert!(!scopes.class_inherits(&ast, base, derived));
    }
}
