//! Two interpreters for [Lox][lox], sharing one lexer.
//!
//! [tree_walk](crate::interpreter) walks the AST [parser] and [resolver] produce directly. [vm]
//! instead runs bytecode that [compiler] emits into a [chunk::Chunk]. See [part II][jlox] and
//! [part III][clox] of [Crafting Interpreters][book] respectively.
//!
//! [book]: https://craftinginterpreters.com/
//! [jlox]: https://craftinginterpreters.com/a-tree-walk-interpreter.html
//! [clox]: https://craftinginterpreters.com/a-bytecode-virtual-machine.html
//! [lox]: https://craftinginterpreters.com/the-lox-language.html

pub mod ast;
pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod intern;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;
pub mod vm;

mod with_try_from_u8;

/// The type returned by various functions that parse, compile, and run Lox code.
/// This is the standard [std::result::Result], but the error is always
/// [error::InterpretationError]. This type alias is generic for the return type, however.
///
/// ```
/// fn compile() -> rlox::Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, error::InterpretationError>;

/// Re-exports common items for the bytecode half of the crate.
///
/// Since Part III of Crafting Interpreters is written in C, which lacks explicit features for
/// scoping across modules, many items are assumed to be globally-visible. Therefore, we export the
/// most common "global" items here. The tree-walk half of the crate (`ast`, `parser`, `resolver`,
/// `environment`, `interpreter`, `value`) has no analogous prelude: its modules are small enough,
/// and distinct enough from each other, to import directly.
pub mod prelude {
    pub use crate::chunk::{Chunk, OpCode, Value};
    pub use crate::error::InterpretationError;
    pub use crate::scanner::{Lexeme, Scanner, Token};
    pub use crate::vm::VM;
}
