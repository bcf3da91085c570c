//! The closed error taxonomy, transcribed in order from `err.c`'s
//! `s_errors` table and `ecma55.h`'s `enum error_code`. `E_OK` has no
//! counterpart here: success is `Result::Ok`, not a variant.

use std::fmt;

/// Whether an [`Error`] is a compile-time diagnostic or a run-time one, and
/// whether it is fatal (stops compilation of the line / stops the VM) or a
/// warning (reported but execution continues).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Severity {
    CompileError,
    CompileWarning,
    RuntimeFatal,
    RuntimeWarning,
}

macro_rules! errors {
    ( $( $variant:ident => ($severity:expr, $msg:expr) ),+ $(,)? ) => {
        #[derive(Clone, Copy, Eq, PartialEq, Debug)]
        pub enum Error {
            $( $variant ),+
        }

        impl Error {
            pub fn severity(self) -> Severity {
                match self {
                    $( Error::$variant => $severity ),+
                }
            }

            pub fn message(self) -> &'static str {
                match self {
                    $( Error::$variant => $msg ),+
                }
            }
        }
    };
}

use Severity::*;

errors! {
    NoMem => (CompileError, "not enough memory"),
    InvalLineNum => (CompileError, "invalid line number"),
    LineTooLong => (CompileError, "line too long"),
    InvalCmd => (CompileError, "invalid command"),
    IndexRange => (RuntimeFatal, "index out of range"),
    StackOflow => (RuntimeFatal, "stack overflow"),
    StackUflow => (RuntimeFatal, "stack underflow"),
    Syntax => (CompileError, "syntax error"),
    NoLine => (CompileError, "non-existing line number"),
    DupOption => (CompileError, "OPTION redeclared"),
    LateOption => (CompileError, "OPTION used after arrays used or DIM"),
    DupDim => (CompileError, "redimensioned variable"),
    TypeMismatch => (CompileError, "type mismatch for variable"),
    InvalDim => (CompileError, "invalid DIM subscript"),
    NumvarArray => (CompileError, "numeric variable used as array"),
    BigArray => (CompileError, "array subscript too high"),
    BigRam => (CompileError, "program ram too big"),
    NextWoutFor => (CompileError, "NEXT without FOR"),
    StrNoend => (CompileError, "string not terminated"),
    InvalTab => (RuntimeWarning, "invalid TAB argument"),
    FunRedeclared => (CompileError, "function redeclared"),
    FunargAsArray => (CompileError, "function argument as array"),
    UndefFun => (CompileError, "undefined function"),
    BadNparams => (CompileError, "invalid number of arguments for function"),
    TooFewInput => (RuntimeWarning, "insuficient input data"),
    TooMuchInput => (RuntimeWarning, "too much input data"),
    VoidInput => (RuntimeWarning, "error on input stream"),
    ConstOverflow => (CompileWarning, "numeric constant overflow"),
    JumpIntoFor => (CompileError, "jump into FOR block"),
    FnameTooLong => (CompileError, "file name too long"),
    Eof => (CompileError, "end of file"),
    Fopen => (CompileError, "couldn't open file"),
    SpaceLineNum => (CompileError, "no space after line number"),
    EmptyLine => (CompileError, "line without instructions"),
    BadNargs => (CompileError, "wrong number of arguments"),
    BadFname => (CompileError, "bad file name"),
    EndUnseen => (CompileError, "program must have an END statement"),
    LinesAfterEnd => (CompileError, "line after an END statement"),
    DivByZero => (RuntimeWarning, "division by zero"),
    OpOverflow => (RuntimeWarning, "operation overflow"),
    ZeroPowNeg => (RuntimeWarning, "zero raised to negative value"),
    NegPowReal => (RuntimeFatal, "negative value raised to non-integral value"),
    ForWithoutNext => (CompileError, "FOR without NEXT"),
    NestedFor => (CompileError, "FOR uses the same variable as outer FOR at line"),
    Dom => (RuntimeFatal, "function domain error"),
    InvalChars => (CompileError, "invalid characters found"),
    DupLine => (CompileError, "duplicated line number"),
    InvalLineOrder => (CompileError, "invalid line order"),
    Bignum => (CompileError, "number too big"),
    InitVar => (RuntimeWarning, "variable used before value assigned"),
    InitArray => (RuntimeWarning, "array position read before value assigned"),
    ReadOflow => (RuntimeFatal, "insufficient data for READ"),
    ReadStr => (RuntimeFatal, "reading string into numeric variable"),
    KeywSpc => (CompileError, "no space after keyword"),
    NumExprExpected => (CompileError, "numeric expression expected"),
    StrExprExpected => (CompileError, "string expression expected"),
    StrRelNotEq => (CompileError, "string expressions can only be tested for equality"),
    NumvarNameExpected => (CompileError, "numeric variable name expected"),
    DatumTooLong => (RuntimeFatal, "string datum contains too many characters"),
}

impl Error {
    pub fn is_fatal(self) -> bool {
        matches!(self.severity(), Severity::CompileError | Severity::RuntimeFatal)
    }

    pub fn is_compile_time(self) -> bool {
        matches!(self.severity(), Severity::CompileError | Severity::CompileWarning)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.severity() {
            Severity::CompileError | Severity::RuntimeFatal => "error",
            Severity::CompileWarning | Severity::RuntimeWarning => "warning",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

impl std::error::Error for Error {}

/// A located diagnostic: the error plus the line (and, for compile-time
/// errors, the column) it was raised at. Printed with the `error: `/
/// `warning: ` prefix mirroring `eprint`/`wprint` in `err.c`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Diagnostic {
    pub error: Error,
    pub line: Option<i32>,
    pub column: Option<usize>,
}

impl Diagnostic {
    pub fn new(error: Error, line: Option<i32>) -> Self {
        Diagnostic { error, line, column: None }
    }

    pub fn with_column(error: Error, line: Option<i32>, column: usize) -> Self {
        Diagnostic { error, line, column: Some(column) }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(line) = self.line {
            if line > 0 {
                write!(f, "{}", line)?;
                if let Some(col) = self.column {
                    write!(f, ":{}", col)?;
                }
                write!(f, ": ")?;
            }
        }
        write!(f, "{}", self.error)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn severity_classification() {
        assert!(Error::Syntax.is_fatal());
        assert!(Error::Syntax.is_compile_time());
        assert!(!Error::DivByZero.is_fatal());
        assert!(!Error::DivByZero.is_compile_time());
        assert!(Error::IndexRange.is_fatal());
        assert!(!Error::IndexRange.is_compile_time());
        assert!(!Error::ConstOverflow.is_fatal());
        assert!(Error::ConstOverflow.is_compile_time());
    }

    #[test]
    fn display_matches_prefix_convention() {
        assert_eq!(Error::Syntax.to_string(), "error: syntax error");
        assert_eq!(Error::DivByZero.to_string(), "warning: division by zero");
    }

    #[test]
    fn diagnostic_formats_line_and_column() {
        let d = Diagnostic::with_column(Error::Syntax, Some(10), 5);
        assert_eq!(d.to_string(), "10:5: error: syntax error");
        let d = Diagnostic::new(Error::Syntax, None);
        assert_eq!(d.to_string(), "error: syntax error");
    }
}
