//! The single-pass Pratt bytecode compiler.
//!
//! A [Parser]/[Compiler] split, a rule-table-driven [parse_precedence](Compiler::parse_precedence),
//! and locals tracked as a parallel stack for scoping. `and`/`or` short-circuiting, `if`/`while`/
//! `for` control flow via jump patching, and string literals (interned via [StringInterner] — see
//! `intern.rs`) round out expression and statement compilation.
//!
//! The bytecode VM implements only a subset of Lox: no functions, classes, or closures (that's the
//! tree-walk interpreter's job). This compiler's grammar is therefore a proper subset of the
//! tree-walk [parser](crate::parser)'s: declarations are `var` and statements; there is no
//! `fun`/`class`/`return`.

use crate::chunk::{Chunk, OpCode, Value, WrittenOpcode};
use crate::diagnostics::{Diagnostic, Location};
use crate::intern::StringInterner;
use crate::scanner::{Lexeme, Scanner, Token};

/////////////////////////////////////////// Public API ////////////////////////////////////////////

/// Compiles the given Lox source code and, if successful, returns one bytecode [Chunk].
pub fn compile(source: &str) -> Result<Chunk, Vec<Diagnostic>> {
    let parser = Parser::new(source);
    let compiler = Compiler::new(parser);
    compiler.compile()
}

///////////////////////////////////// Implementation details //////////////////////////////////////

const U8_COUNT: usize = u8::MAX as usize + 1;

/// Contains the compiler state, which includes the [Parser] and the current chunk being produced.
struct Compiler<'a> {
    parser: Parser<'a>,
    compiling_chunk: Chunk,
    interner: StringInterner,
    locals: Vec<Local<'a>>,
    scope_depth: isize,
}

#[derive(Clone)]
struct Local<'a> {
    name: Lexeme<'a>,
    depth: Option<isize>,
}

/// Contains the parser state, including error status.
struct Parser<'a> {
    scanner: Scanner<'a>,
    current: Lexeme<'a>,
    previous: Lexeme<'a>,
    had_error: bool,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
}

/// A rule in the Pratt parser table. See [Compiler::parse_precedence] for usage.
#[derive(Copy, Clone)]
struct ParserRule {
    prefix: Option<ParserFn>,
    infix: Option<ParserFn>,
    precedence: Precedence,
}

/// Any possible action taken from the parsing table. Actions take the entire compiler state, and
/// convert it, usually emitting bytecode.
type ParserFn = fn(&mut Compiler, bool);

/// Precedence rules for [Token]s in Lox. Ascending order is required for Pratt parsing.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq)]
enum Precedence {
    None,
    /// `=`
    Assignment,
    /// `or`
    Or,
    /// `and`
    And,
    /// `==` `!=`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    /// `+` `-`
    Term,
    /// `*` `/`
    Factor,
    /// `!` `-`
    Unary,
    /// `.` `()`
    Call,
    /// Literals and groupings
    Primary,
}

///////////////////////////////////////// Implementations /////////////////////////////////////////

impl Precedence {
    #[inline]
    fn higher_precedence(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => panic!("Tried to get higher precedence than primary"),
        }
    }
}

impl ParserRule {
    #[inline(always)]
    fn higher_precedence(&self) -> Precedence {
        self.precedence.higher_precedence()
    }
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Parser<'a> {
        let mut scanner = Scanner::new(source);
        let first_token = scanner.scan_token();
        let error_token = scanner.make_sentinel("<before first token>");

        Parser {
            scanner,
            previous: error_token,
            current: first_token,
            had_error: false,
            panic_mode: false,
            diagnostics: Vec::new(),
        }
    }

    fn advance(&mut self) {
        self.previous = self.current;

        loop {
            self.current = self.scanner.scan_token();
            if self.current.token() != Token::Error {
                break;
            }
            self.error_at_current(self.current.text());
        }
    }

    fn consume(&mut self, desired_token: Token, message: &str) {
        if self.current.token() == desired_token {
            return self.advance();
        }
        self.error_at_current(message);
    }

    fn check(&self, token: Token) -> bool {
        self.current.token() == token
    }

    fn match_and_advance(&mut self, desired_token: Token) -> bool {
        if self.check(desired_token) {
            self.advance();
            return true;
        }
        false
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message)
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message)
    }

    fn error_at(&mut self, lexeme: Lexeme<'a>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let location = match lexeme.token() {
            Token::Eof => Location::End,
            Token::Error => Location::None,
            _ => Location::Lexeme(lexeme.text().to_string()),
        };
        self.diagnostics
            .push(Diagnostic::new(lexeme.line(), location, message));
    }

    /// Discard tokens until a statement boundary. Shared heuristic with the tree-walk parser, even
    /// though this one drives a one-pass compiler rather than an AST builder.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.token() != Token::Eof {
            if self.previous.token() == Token::Semicolon {
                return;
            }

            match self.current.token() {
                Token::Class
                | Token::Fun
                | Token::Var
                | Token::For
                | Token::If
                | Token::While
                | Token::Print
                | Token::Return => return,
                _ => (),
            }

            self.advance();
        }
    }
}

impl<'a> Compiler<'a> {
    fn new(parser: Parser) -> Compiler {
        Compiler {
            parser,
            compiling_chunk: Chunk::default(),
            interner: StringInterner::new(),
            locals: Vec::with_capacity(U8_COUNT),
            scope_depth: 0,
        }
    }

    fn compile(mut self) -> Result<Chunk, Vec<Diagnostic>> {
        log::debug!("compiler entry");
        while !self.match_and_advance(Token::Eof) {
            self.declaration();
        }
        self.end_compiler();

        if self.parser.had_error {
            log::debug!("compiler exit: {} diagnostic(s)", self.parser.diagnostics.len());
            return Err(self.parser.diagnostics);
        }

        log::debug!("compiler exit: {} bytes emitted", self.compiling_chunk.len());
        Ok(self.compiling_chunk)
    }

    fn end_compiler(&mut self) {
        self.emit_return();

        if cfg!(feature = "print_code") && !self.parser.had_error {
            crate::debug::disassemble_chunk(self.current_chunk(), "code");
        }
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        assert!(self.scope_depth > 0);
        self.scope_depth -= 1;

        while self.has_locals_beyond_current_scope() {
            self.locals.pop();
            self.emit_instruction(OpCode::Pop);
        }
    }

    fn has_locals_beyond_current_scope(&self) -> bool {
        self.locals
            .last()
            .and_then(|local| local.depth)
            .map(|depth| depth > self.scope_depth)
            .unwrap_or(false)
    }

    /// The core of the Pratt parsing algorithm.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;

        if let Some(prefix_rule) = self.rule_from_previous().prefix {
            prefix_rule(self, can_assign);
        } else {
            self.parser.error("Expect expression.");
            return;
        }

        while precedence <= self.rule_from_current().precedence {
            self.advance();
            let infix_rule = self
                .rule_from_previous()
                .infix
                .expect("a rule with a defined precedence must always have an infix rule");

            infix_rule(self, can_assign);
        }

        if can_assign && self.match_and_advance(Token::Equal) {
            self.parser.error("Invalid assignment target.");
        }
    }

    fn identifier_constant(&mut self, lexeme: Lexeme) -> u8 {
        let name = self.interner.intern(lexeme.text());
        self.make_constant(Value::Str(name))
    }

    fn resolve_local(&mut self, name: Lexeme) -> Option<u8> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.text() == name.text() {
                if local.is_uninitialized() {
                    let message = format!("Can't read local variable '{}' in its own initializer.", name.text());
                    self.parser.error(&message);
                }
                return u8::try_from(i).ok();
            }
        }
        None
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }

        let name = self.parser.previous;

        for local in self.locals.iter().rev() {
            if local.in_outer_scope(self.scope_depth) {
                break;
            }
            if name.text() == local.text() {
                let message = format!("Already a variable called '{}' in this scope.", name.text());
                self.parser.error(&message);
            }
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: Lexeme<'a>) {
        if self.local_count() >= U8_COUNT {
            self.parser
                .error("Too many local variables in function.");
            return;
        }

        assert_eq!(Token::Identifier, name.token());
        self.locals.push(Local { name, depth: None });
    }

    fn parse_variable(&mut self, error_message: &str) -> u8 {
        self.parser.consume(Token::Identifier, error_message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.parser.previous)
    }

    fn mark_initialized(&mut self) {
        self.locals
            .last_mut()
            .unwrap()
            .initialize_scope_with(self.scope_depth);
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }

        self.emit_instruction(OpCode::DefineGlobal).with_operand(global);
    }

    fn named_variable(&mut self, name: Lexeme, can_assign: bool) {
        let (get_op, set_op, arg) = {
            if let Some(arg) = self.resolve_local(name) {
                (OpCode::GetLocal, OpCode::SetLocal, arg)
            } else {
                let arg = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, arg)
            }
        };

        if can_assign && self.match_and_advance(Token::Equal) {
            self.expression();
            self.emit_instruction(set_op).with_operand(arg);
        } else {
            self.emit_instruction(get_op).with_operand(arg);
        }
    }

    ////////////////////////////////////// Declarations & statements //////////////////////////////

    fn declaration(&mut self) {
        if self.match_and_advance(Token::Var) {
            self.var_statement();
        } else {
            self.statement();
        }

        if self.parser.panic_mode {
            self.parser.synchronize();
        }
    }

    fn statement(&mut self) {
        if self.match_and_advance(Token::Print) {
            self.print_statement();
        } else if self.match_and_advance(Token::If) {
            self.if_statement();
        } else if self.match_and_advance(Token::While) {
            self.while_statement();
        } else if self.match_and_advance(Token::For) {
            self.for_statement();
        } else if self.match_and_advance(Token::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn block(&mut self) {
        while !self.parser.check(Token::RightBrace) && !self.parser.check(Token::Eof) {
            self.declaration();
        }
        self.parser.consume(Token::RightBrace, "Expect '}' after block.");
    }

    fn var_statement(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_and_advance(Token::Equal) {
            self.expression();
        } else {
            self.emit_instruction(OpCode::Nil);
        }

        self.parser
            .consume(Token::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.parser.consume(Token::Semicolon, "Expect ';' after expression.");
        self.emit_instruction(OpCode::Pop);
    }

    fn print_statement(&mut self) {
        self.expression();
        self.parser.consume(Token::Semicolon, "Expect ';' after value.");
        self.emit_instruction(OpCode::Print);
    }

    /// `if "(" expression ")" statement ( "else" statement )?` via jump patching.
    fn if_statement(&mut self) {
        self.parser.consume(Token::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.parser.consume(Token::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_instruction(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_instruction(OpCode::Pop);

        if self.match_and_advance(Token::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.parser.consume(Token::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.parser.consume(Token::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_instruction(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_instruction(OpCode::Pop);
    }

    /// Desugars `for (init; cond; step) body` into the equivalent `while` loop directly in
    /// bytecode.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.parser.consume(Token::LeftParen, "Expect '(' after 'for'.");

        if self.match_and_advance(Token::Semicolon) {
            // No initializer.
        } else if self.match_and_advance(Token::Var) {
            self.var_statement();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();

        let mut exit_jump = None;
        if !self.match_and_advance(Token::Semicolon) {
            self.expression();
            self.parser.consume(Token::Semicolon, "Expect ';' after loop condition.");

            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_instruction(OpCode::Pop);
        }

        if !self.parser.check(Token::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_instruction(OpCode::Pop);
            self.parser.consume(Token::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        } else {
            self.parser.consume(Token::RightParen, "Expect ')' after for clauses.");
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_instruction(OpCode::Pop);
        }

        self.end_scope();
    }

    fn emit_jump(&mut self, opcode: OpCode) -> usize {
        let line = self.line_number_of_prefix();
        self.current_chunk().write_opcode(opcode, line).placeholder_u16()
    }

    fn patch_jump(&mut self, offset: usize) {
        if let Err(message) = self.current_chunk().patch_jump(offset) {
            self.parser.error(message);
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.line_number_of_prefix();
        if let Err(message) = self.current_chunk().emit_loop(loop_start, line) {
            self.parser.error(message);
        }
    }

    fn emit_return(&mut self) {
        self.emit_instruction(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_instruction(OpCode::Constant).with_operand(index);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if let Some(index) = self.current_chunk().add_constant(value) {
            index
        } else {
            self.parser.error("Too many constants in one chunk.");
            0
        }
    }

    fn emit_instruction(&mut self, opcode: OpCode) -> WrittenOpcode {
        let line = self.line_number_of_prefix();
        self.current_chunk().write_opcode(opcode, line)
    }

    fn emit_instructions(&mut self, op1: OpCode, op2: OpCode) -> WrittenOpcode {
        let line = self.line_number_of_prefix();
        self.current_chunk().write_opcode(op1, line);
        self.current_chunk().write_opcode(op2, line)
    }

    ///////////////////////////////////////// Aliases /////////////////////////////////////////////

    #[inline(always)]
    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.compiling_chunk
    }

    #[inline(always)]
    fn advance(&mut self) {
        self.parser.advance()
    }

    #[inline(always)]
    fn line_number_of_prefix(&self) -> usize {
        self.parser.previous.line()
    }

    #[inline(always)]
    fn match_and_advance(&mut self, desired_token: Token) -> bool {
        self.parser.match_and_advance(desired_token)
    }

    #[inline(always)]
    fn rule_from_previous(&self) -> ParserRule {
        get_rule(self.previous_token())
    }

    #[inline(always)]
    fn rule_from_current(&self) -> ParserRule {
        get_rule(self.parser.current.token())
    }

    #[inline(always)]
    fn previous_token(&self) -> Token {
        self.parser.previous.token()
    }

    #[inline(always)]
    fn local_count(&self) -> usize {
        self.locals.len()
    }
}

impl<'a> Local<'a> {
    #[inline(always)]
    fn is_uninitialized(&self) -> bool {
        self.depth.is_none()
    }

    #[inline]
    fn initialize_scope_with(&mut self, scope_depth: isize) {
        debug_assert!(self.is_uninitialized());
        self.depth = Some(scope_depth);
    }

    #[inline(always)]
    fn in_outer_scope(&self, scope_depth: isize) -> bool {
        matches!(self.depth, Some(depth) if depth < scope_depth)
    }

    fn text(&self) -> &'a str {
        self.name.text()
    }
}

////////////////////////////////////////// Parser rules ///////////////////////////////////////////

macro_rules! rule {
    ($prefix:expr, $infix:expr, $precedence:expr) => {
        ParserRule {
            prefix: $prefix,
            infix: $infix,
            precedence: $precedence,
        }
    };
}

#[rustfmt::skip]
fn get_rule(token: Token) -> ParserRule {
    use Token::*;
    match token {
        //                     Prefix          Infix         Precedence
        LeftParen    => rule!{ Some(grouping), None,         Precedence::None },
        RightParen   => rule!{ None,           None,         Precedence::None },
        LeftBrace    => rule!{ None,           None,         Precedence::None },
        RightBrace   => rule!{ None,           None,         Precedence::None },
        Comma        => rule!{ None,           None,         Precedence::None },
        Dot          => rule!{ None,           None,         Precedence::None },
        Minus        => rule!{ Some(unary),    Some(binary), Precedence::Term },
        Plus         => rule!{ None,           Some(binary), Precedence::Term },
        Semicolon    => rule!{ None,           None,         Precedence::None },
        Slash        => rule!{ None,           Some(binary), Precedence::Factor },
        Star         => rule!{ None,           Some(binary), Precedence::Factor },
        Bang         => rule!{ Some(unary),    None,         Precedence::None },
        BangEqual    => rule!{ None,           Some(binary), Precedence::Equality },
        Equal        => rule!{ None,           None,         Precedence::None },
        EqualEqual   => rule!{ None,           Some(binary), Precedence::Equality },
        Greater      => rule!{ None,           Some(binary), Precedence::Comparison },
        GreaterEqual => rule!{ None,           Some(binary), Precedence::Comparison },
        Less         => rule!{ None,           Some(binary), Precedence::Comparison },
        LessEqual    => rule!{ None,           Some(binary), Precedence::Comparison },
        Identifier   => rule!{ Some(variable), None,         Precedence::None },
        StrLiteral   => rule!{ Some(string),   None,         Precedence::None },
        Number       => rule!{ Some(number),   None,         Precedence::None },
        And          => rule!{ None,           Some(and_),   Precedence::And },
        Class        => rule!{ None,           None,         Precedence::None },
        Else         => rule!{ None,           None,         Precedence::None },
        False        => rule!{ Some(literal),  None,         Precedence::None },
        For          => rule!{ None,           None,         Precedence::None },
        Fun          => rule!{ None,           None,         Precedence::None },
        If           => rule!{ None,           None,         Precedence::None },
        Nil          => rule!{ Some(literal),  None,         Precedence::None },
        Or           => rule!{ None,           Some(or_),    Precedence::Or },
        Print        => rule!{ None,           None,         Precedence::None },
        Return       => rule!{ None,           None,         Precedence::None },
        Super        => rule!{ None,           None,         Precedence::None },
        This         => rule!{ None,           None,         Precedence::None },
        True         => rule!{ Some(literal),  None,         Precedence::None },
        Var          => rule!{ None,           None,         Precedence::None },
        While        => rule!{ None,           None,         Precedence::None },
        Error        => rule!{ None,           None,         Precedence::None },
        Eof          => rule!{ None,           None,         Precedence::None },
    }
}

fn grouping(compiler: &mut Compiler, _can_assign: bool) {
    debug_assert_eq!(Token::LeftParen, compiler.previous_token());
    compiler.expression();
    compiler
        .parser
        .consume(Token::RightParen, "Expect ')' after expression.");
}

fn number(compiler: &mut Compiler, _can_assign: bool) {
    debug_assert_eq!(Token::Number, compiler.previous_token());
    let value = compiler
        .parser
        .previous
        .text()
        .parse::<f64>()
        .expect("scanner only yields well-formed number lexemes");
    compiler.emit_constant(value.into());
}

fn unary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous_token();

    compiler.parse_precedence(Precedence::Unary);

    match operator {
        Token::Bang => compiler.emit_instruction(OpCode::Not),
        Token::Minus => compiler.emit_instruction(OpCode::Negate),
        _ => unreachable!(),
    };
}

fn binary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous_token();
    let rule = get_rule(operator);

    compiler.parse_precedence(rule.higher_precedence());
    match operator {
        Token::BangEqual => compiler.emit_instructions(OpCode::Equal, OpCode::Not),
        Token::EqualEqual => compiler.emit_instruction(OpCode::Equal),
        Token::Greater => compiler.emit_instruction(OpCode::Greater),
        Token::GreaterEqual => compiler.emit_instructions(OpCode::Less, OpCode::Not),
        Token::Less => compiler.emit_instruction(OpCode::Less),
        Token::LessEqual => compiler.emit_instructions(OpCode::Greater, OpCode::Not),
        Token::Plus => compiler.emit_instruction(OpCode::Add),
        Token::Minus => compiler.emit_instruction(OpCode::Subtract),
        Token::Star => compiler.emit_instruction(OpCode::Multiply),
        Token::Slash => compiler.emit_instruction(OpCode::Divide),
        _ => unreachable!(),
    };
}

fn literal(compiler: &mut Compiler, _can_assign: bool) {
    match compiler.previous_token() {
        Token::False => compiler.emit_instruction(OpCode::False),
        Token::Nil => compiler.emit_instruction(OpCode::Nil),
        Token::True => compiler.emit_instruction(OpCode::True),
        _ => unreachable!(),
    };
}

fn string(compiler: &mut Compiler, _can_assign: bool) {
    debug_assert_eq!(Token::StrLiteral, compiler.previous_token());

    let literal = compiler.parser.previous.text();
    debug_assert!(literal.len() >= 2 && literal.starts_with('"') && literal.ends_with('"'));

    let last_index = literal.len() - 1;
    let contents = &literal[1..last_index];
    let interned = compiler.interner.intern(contents);
    compiler.emit_constant(Value::Str(interned));
}

fn variable(compiler: &mut Compiler, can_assign: bool) {
    compiler.named_variable(compiler.parser.previous, can_assign);
}

/// `and` short-circuits: if the left operand is falsy, skip the right operand and leave the left
/// operand's (falsy) value on the stack.
fn and_(compiler: &mut Compiler, _can_assign: bool) {
    let end_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    compiler.emit_instruction(OpCode::Pop);
    compiler.parse_precedence(Precedence::And);
    compiler.patch_jump(end_jump);
}

/// `or` short-circuits the opposite way: if the left operand is truthy, jump past the right
/// operand.
fn or_(compiler: &mut Compiler, _can_assign: bool) {
    let else_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    let end_jump = compiler.emit_jump(OpCode::Jump);

    compiler.patch_jump(else_jump);
    compiler.emit_instruction(OpCode::Pop);

    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}

////////////////////////////////////////////// Tests //////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn precedence_confidence_check() {
        assert!(Precedence::Assignment < Precedence::Or);
        assert!(Precedence::Or < Precedence::And);
        assert!(Precedence::And < Precedence::Equality);
        assert!(Precedence::Equality < Precedence::Comparison);
        assert!(Precedence::Call > Precedence::Factor);
        assert!(Precedence::Factor > Precedence::Term);
        assert_eq!(Precedence::And, Precedence::Or.higher_precedence());
        assert_eq!(Precedence::Factor, Precedence::Term.higher_precedence());
    }

    #[test]
    fn compiles_arithmetic() {
        let chunk = compile("print 1 + 2 * 3;").expect("should compile");
        assert!(!chunk.is_empty());
    }

    #[test]
    fn reports_unterminated_string() {
        let result = compile("print \"unterminated;");
        assert!(result.is_err());
    }

    #[test]
    fn deeply_nested_blocks_compile() {
        let mut src = String::from("{ var x = 1;");
        for _ in 0..200 {
            src.push_str("{ var y = 1;");
        }
        for _ in 0..200 {
            src.push('}');
        }
        src.push('}');
        assert!(compile(&src).is_ok());
    }

    #[test]
    fn too_many_locals_in_one_scope_is_an_error() {
        let mut src = String::from("{");
        for i in 0..=256 {
            src.push_str(&format!("var v{i} = {i};"));
        }
        src.push('}');
        assert!(compile(&src).is_err());
    }
}
