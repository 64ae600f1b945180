//! Public interface for running Sigh code.

use tracing::debug;

use crate::{
    analyze::{analyze, Analysis},
    ast::Ast,
    errors::SighError,
    interpret::interpret,
    io::PrintWriter,
    object::Object,
    parse::parse,
};

/// Primary interface for running Sigh code.
///
/// `Runner::new` lexes, parses and analyzes the program; every semantic
/// error is collected and returned in one batch. A successfully built
/// runner holds the decorated AST and can be run any number of times.
///
/// # Example
/// ```
/// use sigh::{CollectStringPrint, Runner};
///
/// let runner = Runner::new("print(\"Hello\")", "hello.si").unwrap();
/// let mut print = CollectStringPrint::new();
/// runner.run(&mut print).unwrap();
/// assert_eq!(print.output(), "Hello\n");
/// ```
pub struct Runner {
    script_name: String,
    ast: Ast,
    analysis: Analysis,
}

impl Runner {
    /// Parses and analyzes `source`.
    ///
    /// # Errors
    /// Returns [`SighError::Parse`] on the first syntax error, or
    /// [`SighError::Semantic`] carrying every semantic error found.
    pub fn new(source: &str, script_name: &str) -> Result<Self, SighError> {
        let mut ast = parse(source)?;
        debug!(script = script_name, nodes = ast.len(), "parsed");
        let analysis = analyze(&mut ast).map_err(SighError::Semantic)?;
        Ok(Self {
            script_name: script_name.to_owned(),
            ast,
            analysis,
        })
    }

    /// The script name given to [`Runner::new`].
    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// The parsed syntax tree.
    #[must_use]
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// The parsed syntax tree as a JSON value, for dump tooling.
    ///
    /// # Panics
    /// Does not panic on analyzed programs: every node the parser produces
    /// (including float literals, which are always finite) serializes.
    #[must_use]
    pub fn dump_ast(&self) -> serde_json::Value {
        serde_json::to_value(&self.ast).expect("the AST serializes to JSON")
    }

    /// Executes the program.
    ///
    /// Returns the value of a top-level `return`, if the program ended with
    /// one. The writer must be `Send` because async functions run on their
    /// own OS threads and print through the same writer.
    ///
    /// # Errors
    /// Returns [`SighError::Runtime`] for the first runtime error, on the
    /// main thread or on any async thread.
    pub fn run(&self, print: &mut (impl PrintWriter + Send)) -> Result<Option<Object>, SighError> {
        let result = interpret(&self.ast, &self.analysis, print)?;
        Ok(result)
    }
}
