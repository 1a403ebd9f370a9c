use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LexError {
    #[error("Unterminated multiline comment")]
    #[diagnostic(code(lex::unterminated_comment))]
    UnterminatedComment {
        #[source_code]
        src: String,

        #[label("comment started here but was never closed")]
        span: SourceSpan,
    },

    #[error("Unterminated string literal")]
    #[diagnostic(help("Make sure all string literals are closed with a `\"`."), code(lex::unterminated_string))]
    UnterminatedString {
        #[source_code]
        src: String,

        #[label("string starts here but never ends")]
        span: SourceSpan,
    },

    #[error("Unexpected character: {character}")]
    #[diagnostic(help("This character isn't recognized by the lexer."), code(lex::unexpected_char))]
    UnexpectedCharacter {
        #[source_code]
        src: String,

        #[label("unexpected `{character}` found here")]
        span: SourceSpan,

        character: char,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Expected {expected}, found {found}")]
    #[diagnostic(help("The parser expected a different token here."), code(parse::unexpected_token))]
    UnexpectedToken {
        #[source_code]
        src: String,

        #[label("unexpected token found here")]
        span: SourceSpan,

        expected: String,
        found: String,
    },

    #[error("Expected identifier")]
    #[diagnostic(help("Expected {context} name here"), code(parse::expected_identifier))]
    ExpectedIdentifier {
        #[source_code]
        src: String,

        #[label("expected identifier here")]
        span: SourceSpan,

        context: String,
    },

    #[error("Expected type name")]
    #[diagnostic(help("Every declaration needs a `: type` annotation"), code(parse::expected_type))]
    ExpectedType {
        #[source_code]
        src: String,

        #[label("expected a type name here")]
        span: SourceSpan,
    },

    #[error("Expected expression")]
    #[diagnostic(help("An expression was expected at this position."), code(parse::expected_expression))]
    ExpectedExpression {
        #[source_code]
        src: String,

        #[label("expected an expression here")]
        span: SourceSpan,
    },

    #[error("Missing semicolon")]
    #[diagnostic(help("this statement must end with a semicolon (`;`)."), code(parse::missing_semicolon))]
    MissingSemicolon {
        #[source_code]
        src: String,

        #[label("expected ';' here")]
        span: SourceSpan,
    },

    #[error("Expected {expected}, found end of file")]
    #[diagnostic(help("Complete the statement"), code(parse::unexpected_eof))]
    UnexpectedEof {
        #[source_code]
        src: String,

        expected: String,
    },

    #[error("This statement cannot be exported")]
    #[diagnostic(
        help("only function, extern, class and variable declarations can follow `export`"),
        code(parse::invalid_export)
    )]
    InvalidExport {
        #[source_code]
        src: String,

        #[label("not an exportable declaration")]
        span: SourceSpan,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("Unable to find a variable named `{name}`")]
    #[diagnostic(help("Make sure the variable is declared before using it"), code(compile::unbound_name))]
    UnboundName {
        #[source_code]
        src: String,

        #[label("not found in this scope or any enclosing scope")]
        span: SourceSpan,

        name: String,
    },

    #[error("Function `{name}` not found")]
    #[diagnostic(code(compile::unknown_function))]
    UnknownFunction {
        #[source_code]
        src: String,

        #[label("no function with this name has been declared")]
        span: SourceSpan,

        name: String,
    },

    #[error("Class `{name}` not found")]
    #[diagnostic(code(compile::unknown_class))]
    UnknownClass {
        #[source_code]
        src: String,

        #[label("no class with this name has been declared")]
        span: SourceSpan,

        name: String,
    },

    #[error("No field `{field}` on type `{type_name}`")]
    #[diagnostic(code(compile::unknown_field))]
    UnknownField {
        #[source_code]
        src: String,

        #[label("unknown field")]
        span: SourceSpan,

        field: String,
        type_name: String,
    },

    #[error("Method `{method}` not found on type `{type_name}`")]
    #[diagnostic(code(compile::unknown_method))]
    UnknownMethod {
        #[source_code]
        src: String,

        #[label("unknown method")]
        span: SourceSpan,

        method: String,
        type_name: String,
    },

    #[error("Function `{name}` does not return a value")]
    #[diagnostic(
        help("every path through a non-void function must end in `return`"),
        code(compile::missing_return)
    )]
    MissingReturn {
        #[source_code]
        src: String,

        #[label("this function can fall off the end without returning")]
        span: SourceSpan,

        name: String,
    },

    #[error("Field definitions are not allowed outside of classes")]
    #[diagnostic(code(compile::field_outside_class))]
    FieldOutsideClass {
        #[source_code]
        src: String,

        #[label("field declared here")]
        span: SourceSpan,
    },

    #[error("`break` used outside of a loop")]
    #[diagnostic(code(compile::break_outside_loop))]
    BreakOutsideLoop {
        #[source_code]
        src: String,

        #[label("no enclosing loop to break out of")]
        span: SourceSpan,
    },

    #[error("`continue` used outside of a loop")]
    #[diagnostic(code(compile::continue_outside_loop))]
    ContinueOutsideLoop {
        #[source_code]
        src: String,

        #[label("no enclosing loop to continue")]
        span: SourceSpan,
    },

    #[error("Import path `{path}` is a directory")]
    #[diagnostic(help("import a `.cffc` source file, not a directory"), code(compile::import_is_directory))]
    ImportIsDirectory {
        #[source_code]
        src: String,

        #[label("resolves to a directory")]
        span: SourceSpan,

        path: String,
    },

    #[error("Unable to read import `{path}`: {message}")]
    #[diagnostic(code(compile::import_io))]
    ImportIo {
        #[source_code]
        src: String,

        #[label("imported here")]
        span: SourceSpan,

        path: String,
        message: String,
    },

    #[error("Cannot call method `{method}` on a non-class value")]
    #[diagnostic(code(compile::method_on_value))]
    MethodOnValue {
        #[source_code]
        src: String,

        #[label("receiver is not a class instance")]
        span: SourceSpan,

        method: String,
    },

    #[error("Wrong number of arguments for the `{name}` constructor: expected {expected}, found {found}")]
    #[diagnostic(code(compile::wrong_constructor_arity))]
    WrongConstructorArity {
        #[source_code]
        src: String,

        #[label("incorrect number of arguments")]
        span: SourceSpan,

        name: String,
        expected: usize,
        found: usize,
    },
}
