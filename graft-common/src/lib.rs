//! # Unit Wire Format (producers ↔ instrumentation core)
//!
//! Defines the binary container for code units shared between unit
//! producers (compilers, fixture builders) and the instrumentation engine.
//! The format is deliberately small: a header, a method table, and opaque
//! length-prefixed method bodies that decode to an opcode sequence on
//! demand.
//!
//! ## Container layout
//!
//! All integers are ULEB128 unless noted.
//!
//! ```text
//! unit    := magic(4) version(u8) flags(u8) name(str) source(str) count method*
//! method  := sig(str) mflags(u8) [bodylen body]     -- body iff concrete
//! str     := len utf8-bytes
//! body    := op*
//! op      := tag(u8) operands
//! ```
//!
//! Bodies are kept as raw bytes inside [`Method`] and decoded individually
//! via [`Method::ops`], so one malformed body never prevents the rest of a
//! unit from being processed.
//!
//! ## Key types
//!
//! - [`Unit`] - a named, independently loadable piece of executable logic
//! - [`Method`] - signature, modifier flags, opaque body
//! - [`Op`] - body opcodes, including the probe opcodes that only the
//!   instrumentation engine emits
//! - [`UnitBuilder`] - fluent construction of well-formed units

mod leb128;

use thiserror::Error;

// ============================================================================
// Header constants
// ============================================================================

/// Leading magic of every encoded unit.
pub const MAGIC: [u8; 4] = *b"GRFT";

/// Current container version.
pub const FORMAT_VERSION: u8 = 1;

/// Unit flag: set once the instrumentation engine has rewritten the unit.
/// A unit carrying this flag is never rewritten again.
pub const UNIT_FLAG_INSTRUMENTED: u8 = 1 << 0;

/// Method flag: body is provided by the platform, not expressible here.
pub const METHOD_FLAG_NATIVE: u8 = 1 << 0;

/// Method flag: declared without a body.
pub const METHOD_FLAG_ABSTRACT: u8 = 1 << 1;

// Opcode tags. 0x1x is reserved for probes injected by the engine.
const OP_CALL: u8 = 0x01;
const OP_SPAWN: u8 = 0x02;
const OP_WORK: u8 = 0x03;
const OP_FAIL: u8 = 0x04;
const OP_RET: u8 = 0x05;
const OP_PROBE_ENTER: u8 = 0x10;
const OP_PROBE_SPAWN: u8 = 0x11;

// ============================================================================
// Errors
// ============================================================================

/// Failure while decoding a unit or a method body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a unit: bad magic")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("invalid varint")]
    InvalidVarint,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("{0} trailing bytes after unit")]
    TrailingBytes(usize),
}

// ============================================================================
// Opcodes
// ============================================================================

/// One operation of a method body.
///
/// `line` operands are 1-based line numbers into the owning unit's source
/// file, baked in at build time; they survive probe injection unchanged, so
/// caller locations always refer to the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Invoke another method by fully qualified name.
    Call { target: String, line: u32 },
    /// The platform's thread-spawn primitive: run `target` on a new thread.
    Spawn { target: String, line: u32 },
    /// Deterministic busy work.
    Work { amount: u32 },
    /// Raise a failure that propagates out of the method.
    Fail { message: String },
    /// Return early from the method.
    Ret,
    /// Injected: open the method's tracing span. Engine-emitted only.
    ProbeEnter { sig: String },
    /// Injected: traced replacement of [`Op::Spawn`]. Engine-emitted only.
    ProbeSpawn { target: String, line: u32 },
}

impl Op {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Call { target, line } => {
                out.push(OP_CALL);
                write_str(out, target);
                leb128::write_u64(out, u64::from(*line));
            }
            Self::Spawn { target, line } => {
                out.push(OP_SPAWN);
                write_str(out, target);
                leb128::write_u64(out, u64::from(*line));
            }
            Self::Work { amount } => {
                out.push(OP_WORK);
                leb128::write_u64(out, u64::from(*amount));
            }
            Self::Fail { message } => {
                out.push(OP_FAIL);
                write_str(out, message);
            }
            Self::Ret => out.push(OP_RET),
            Self::ProbeEnter { sig } => {
                out.push(OP_PROBE_ENTER);
                write_str(out, sig);
            }
            Self::ProbeSpawn { target, line } => {
                out.push(OP_PROBE_SPAWN);
                write_str(out, target);
                leb128::write_u64(out, u64::from(*line));
            }
        }
    }

    fn decode(bytes: &[u8], offset: &mut usize) -> Result<Self, DecodeError> {
        let tag = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        match tag {
            OP_CALL => Ok(Self::Call {
                target: read_str(bytes, offset)?,
                line: leb128::read_u32(bytes, offset)?,
            }),
            OP_SPAWN => Ok(Self::Spawn {
                target: read_str(bytes, offset)?,
                line: leb128::read_u32(bytes, offset)?,
            }),
            OP_WORK => Ok(Self::Work { amount: leb128::read_u32(bytes, offset)? }),
            OP_FAIL => Ok(Self::Fail { message: read_str(bytes, offset)? }),
            OP_RET => Ok(Self::Ret),
            OP_PROBE_ENTER => Ok(Self::ProbeEnter { sig: read_str(bytes, offset)? }),
            OP_PROBE_SPAWN => Ok(Self::ProbeSpawn {
                target: read_str(bytes, offset)?,
                line: leb128::read_u32(bytes, offset)?,
            }),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

/// Decodes a full body blob into its opcode sequence.
pub fn decode_ops(body: &[u8]) -> Result<Vec<Op>, DecodeError> {
    let mut ops = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        ops.push(Op::decode(body, &mut offset)?);
    }
    Ok(ops)
}

/// Encodes an opcode sequence into a body blob.
pub fn encode_ops(ops: &[Op]) -> Vec<u8> {
    let mut out = Vec::new();
    for op in ops {
        op.encode(&mut out);
    }
    out
}

// ============================================================================
// Unit and method
// ============================================================================

/// One method of a [`Unit`]: signature, modifier flags, opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Unqualified signature, e.g. `bar()`.
    pub sig: String,
    /// Modifier bits, see [`METHOD_FLAG_NATIVE`] and [`METHOD_FLAG_ABSTRACT`].
    pub flags: u8,
    /// Raw encoded body; empty for native and abstract methods.
    pub body: Vec<u8>,
}

impl Method {
    pub fn is_native(&self) -> bool {
        self.flags & METHOD_FLAG_NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.flags & METHOD_FLAG_ABSTRACT != 0
    }

    /// A method can carry probes iff it has a concrete body.
    pub fn is_concrete(&self) -> bool {
        !self.is_native() && !self.is_abstract()
    }

    /// Decodes this method's body on demand.
    pub fn ops(&self) -> Result<Vec<Op>, DecodeError> {
        decode_ops(&self.body)
    }
}

/// A named, independently loadable piece of executable logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Dotted unit name, e.g. `com.example.Foo`.
    pub name: String,
    /// Source file recorded in caller locations, e.g. `Foo.unit`.
    pub source_file: String,
    /// Unit bits, see [`UNIT_FLAG_INSTRUMENTED`].
    pub flags: u8,
    pub methods: Vec<Method>,
}

impl Unit {
    pub fn is_instrumented(&self) -> bool {
        self.flags & UNIT_FLAG_INSTRUMENTED != 0
    }

    /// Fully qualified name of one of this unit's methods.
    pub fn qualified(&self, sig: &str) -> String {
        format!("{}.{}", self.name, sig)
    }

    /// Decodes a unit from its encoded form. Method bodies stay raw.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let mut offset = MAGIC.len();

        let version = *bytes.get(offset).ok_or(DecodeError::UnexpectedEof)?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        offset += 1;

        let flags = *bytes.get(offset).ok_or(DecodeError::UnexpectedEof)?;
        offset += 1;

        let name = read_str(bytes, &mut offset)?;
        let source_file = read_str(bytes, &mut offset)?;

        let count = leb128::read_len(bytes, &mut offset)?;
        let mut methods = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let sig = read_str(bytes, &mut offset)?;
            let mflags = *bytes.get(offset).ok_or(DecodeError::UnexpectedEof)?;
            offset += 1;

            let concrete = mflags & (METHOD_FLAG_NATIVE | METHOD_FLAG_ABSTRACT) == 0;
            let body = if concrete {
                let len = leb128::read_len(bytes, &mut offset)?;
                let end = offset.checked_add(len).ok_or(DecodeError::UnexpectedEof)?;
                let body =
                    bytes.get(offset..end).ok_or(DecodeError::UnexpectedEof)?.to_vec();
                offset = end;
                body
            } else {
                Vec::new()
            };
            methods.push(Method { sig, flags: mflags, body });
        }

        if offset != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - offset));
        }

        Ok(Self { name, source_file, flags, methods })
    }

    /// Encodes the unit. Deterministic: decode∘encode is the identity.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.push(FORMAT_VERSION);
        out.push(self.flags);
        write_str(&mut out, &self.name);
        write_str(&mut out, &self.source_file);
        leb128::write_u64(&mut out, self.methods.len() as u64);
        for method in &self.methods {
            write_str(&mut out, &method.sig);
            out.push(method.flags);
            if method.is_concrete() {
                leb128::write_u64(&mut out, method.body.len() as u64);
                out.extend_from_slice(&method.body);
            }
        }
        out
    }
}

fn read_str(bytes: &[u8], offset: &mut usize) -> Result<String, DecodeError> {
    let len = leb128::read_len(bytes, offset)?;
    let end = offset.checked_add(len).ok_or(DecodeError::UnexpectedEof)?;
    let raw = bytes.get(*offset..end).ok_or(DecodeError::UnexpectedEof)?;
    *offset = end;
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    leb128::write_u64(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

// ============================================================================
// Builders
// ============================================================================

/// Fluent construction of well-formed units, mainly for fixtures and demos.
///
/// ```
/// use graft_common::UnitBuilder;
///
/// let unit = UnitBuilder::new("com.example.Foo")
///     .method("bar()", |m| m.work(10).spawn("com.example.Foo.task()"))
///     .method("task()", |m| m.work(5))
///     .native_method("hash()")
///     .build();
/// assert_eq!(unit.source_file, "Foo.unit");
/// ```
#[derive(Debug)]
pub struct UnitBuilder {
    name: String,
    source_file: Option<String>,
    methods: Vec<Method>,
}

impl UnitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), source_file: None, methods: Vec::new() }
    }

    /// Overrides the default `<SimpleName>.unit` source-file name.
    #[must_use]
    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    /// Adds a concrete method whose body is built by `build`.
    #[must_use]
    pub fn method(mut self, sig: impl Into<String>, build: impl FnOnce(BodyBuilder) -> BodyBuilder) -> Self {
        let body = build(BodyBuilder::new()).encode();
        self.methods.push(Method { sig: sig.into(), flags: 0, body });
        self
    }

    #[must_use]
    pub fn native_method(mut self, sig: impl Into<String>) -> Self {
        self.methods.push(Method { sig: sig.into(), flags: METHOD_FLAG_NATIVE, body: Vec::new() });
        self
    }

    #[must_use]
    pub fn abstract_method(mut self, sig: impl Into<String>) -> Self {
        self.methods.push(Method {
            sig: sig.into(),
            flags: METHOD_FLAG_ABSTRACT,
            body: Vec::new(),
        });
        self
    }

    pub fn build(self) -> Unit {
        let source_file = self.source_file.unwrap_or_else(|| {
            let simple = self.name.rsplit('.').next().unwrap_or(&self.name);
            format!("{simple}.unit")
        });
        Unit { name: self.name, source_file, flags: 0, methods: self.methods }
    }
}

/// Builds a method body, assigning each operation the next 1-based line.
#[derive(Debug, Default)]
pub struct BodyBuilder {
    ops: Vec<Op>,
}

impl BodyBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn next_line(&self) -> u32 {
        self.ops.len() as u32 + 1
    }

    #[must_use]
    pub fn call(mut self, target: impl Into<String>) -> Self {
        let line = self.next_line();
        self.ops.push(Op::Call { target: target.into(), line });
        self
    }

    #[must_use]
    pub fn spawn(mut self, target: impl Into<String>) -> Self {
        let line = self.next_line();
        self.ops.push(Op::Spawn { target: target.into(), line });
        self
    }

    #[must_use]
    pub fn work(mut self, amount: u32) -> Self {
        self.ops.push(Op::Work { amount });
        self
    }

    #[must_use]
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.ops.push(Op::Fail { message: message.into() });
        self
    }

    #[must_use]
    pub fn ret(mut self) -> Self {
        self.ops.push(Op::Ret);
        self
    }

    fn encode(self) -> Vec<u8> {
        encode_ops(&self.ops)
    }
}
