//! Contract ABI model and Solidity ABI codec
//!
//! The ABI is read from standard compiler JSON. Arguments arrive as JSON
//! values straight from suite files, so encoding works on
//! `serde_json::Value` directly, and decoding produces JSON values as well:
//! integers become decimal strings (256-bit safe), addresses and byte strings
//! become lowercase `0x` hex, tuples and arrays become JSON arrays.

use primitive_types::U256;
use serde::Deserialize;
use serde_json::Value;
use sha3::{Digest, Keccak256};

use super::{Address, ChainError, ChainResult, RawLog};

/// Selector of the standard `Error(string)` revert payload
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of the compiler-generated `Panic(uint256)` revert payload
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Keccak-256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

fn abi_err(msg: impl Into<String>) -> ChainError {
    ChainError::Abi(msg.into())
}

/// A parsed contract ABI
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Abi {
    items: Vec<AbiItem>,
}

/// One entry of a JSON ABI
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AbiItem {
    Function(Function),
    Event(Event),
    Constructor(Constructor),
    Error(CustomError),
    /// fallback / receive and anything newer
    #[serde(other)]
    Other,
}

/// Declared state mutability of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    #[default]
    Nonpayable,
    Payable,
}

/// A function or event parameter
#[derive(Debug, Clone, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub components: Vec<Param>,
    #[serde(default)]
    pub indexed: bool,
}

impl Param {
    pub fn param_type(&self) -> ChainResult<ParamType> {
        ParamType::parse(&self.kind, &self.components)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub outputs: Vec<Param>,
    #[serde(default)]
    pub state_mutability: StateMutability,
    /// Pre-0.5 compilers mark view functions with `constant: true`
    #[serde(default)]
    pub constant: Option<bool>,
}

impl Function {
    /// Whether the function can be invoked without a transaction
    pub fn is_read_only(&self) -> bool {
        matches!(
            self.state_mutability,
            StateMutability::View | StateMutability::Pure
        ) || self.constant == Some(true)
    }

    /// Canonical signature, e.g. `transfer(address,uint256)`
    pub fn signature(&self) -> ChainResult<String> {
        signature(&self.name, &self.inputs)
    }

    pub fn selector(&self) -> ChainResult<[u8; 4]> {
        let hash = keccak256(self.signature()?.as_bytes());
        Ok([hash[0], hash[1], hash[2], hash[3]])
    }

    /// Calldata for invoking this function with `args`
    pub fn encode_call(&self, args: &[Value]) -> ChainResult<Vec<u8>> {
        let types = param_types(&self.inputs)?;
        let mut data = self.selector()?.to_vec();
        data.extend(encode(&types, args)?);
        Ok(data)
    }

    /// Decode return data
    ///
    /// A single output decodes to its value, several outputs to an array,
    /// no outputs to `null`.
    pub fn decode_output(&self, data: &[u8]) -> ChainResult<Value> {
        let types = param_types(&self.outputs)?;
        let mut values = decode(&types, data)?;
        Ok(match values.len() {
            0 => Value::Null,
            1 => values.remove(0),
            _ => Value::Array(values),
        })
    }

    /// Encode a return value (used by fakes answering `call`)
    pub fn encode_output(&self, value: &Value) -> ChainResult<Vec<u8>> {
        let types = param_types(&self.outputs)?;
        match types.len() {
            0 => Ok(Vec::new()),
            1 => encode(&types, std::slice::from_ref(value)),
            _ => encode(&types, value.as_array().map(Vec::as_slice).unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constructor {
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub state_mutability: StateMutability,
}

impl Constructor {
    pub fn encode_args(&self, args: &[Value]) -> ChainResult<Vec<u8>> {
        encode(&param_types(&self.inputs)?, args)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub anonymous: bool,
}

/// An event decoded from a raw log, arguments in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub name: String,
    pub args: Vec<(String, Value)>,
}

impl Event {
    pub fn signature(&self) -> ChainResult<String> {
        signature(&self.name, &self.inputs)
    }

    /// topic0 of non-anonymous logs
    pub fn topic(&self) -> ChainResult<[u8; 32]> {
        Ok(keccak256(self.signature()?.as_bytes()))
    }

    /// Decode a log emitted for this event
    pub fn decode_log(&self, log: &RawLog) -> ChainResult<DecodedLog> {
        let mut topics = log.topics.iter();
        if !self.anonymous {
            topics.next();
        }

        let mut data_types = Vec::new();
        for param in self.inputs.iter().filter(|p| !p.indexed) {
            data_types.push(param.param_type()?);
        }
        let mut data_values = decode(&data_types, &log.data)?.into_iter();

        let mut args = Vec::with_capacity(self.inputs.len());
        for (i, param) in self.inputs.iter().enumerate() {
            let name = if param.name.is_empty() {
                format!("arg{i}")
            } else {
                param.name.clone()
            };
            let value = if param.indexed {
                let topic = topics.next().ok_or_else(|| {
                    abi_err(format!("log for '{}' is missing topic for '{}'", self.name, name))
                })?;
                let ty = param.param_type()?;
                if ty.is_dynamic()
                    || matches!(ty, ParamType::Tuple(_) | ParamType::FixedArray(..))
                {
                    // Indexed reference types only carry their hash
                    Value::String(format!("0x{}", hex::encode(topic)))
                } else {
                    decode_value(&ty, topic, 0, 0)?.0
                }
            } else {
                data_values.next().ok_or_else(|| {
                    abi_err(format!("log for '{}' is missing data for '{}'", self.name, name))
                })?
            };
            args.push((name, value));
        }

        Ok(DecodedLog {
            name: self.name.clone(),
            args,
        })
    }

    /// Build the raw log this event would produce for `args`
    pub fn encode_log(&self, address: Address, args: &[Value]) -> ChainResult<RawLog> {
        if args.len() != self.inputs.len() {
            return Err(abi_err(format!(
                "event '{}' expects {} arguments, got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }

        let mut topics = Vec::new();
        if !self.anonymous {
            topics.push(self.topic()?);
        }
        let mut data_types = Vec::new();
        let mut data_values = Vec::new();

        for (param, value) in self.inputs.iter().zip(args) {
            let ty = param.param_type()?;
            if param.indexed {
                let encoded = match ty {
                    // Indexed strings and bytes are hashed unpadded
                    ParamType::String => value.as_str().unwrap_or_default().as_bytes().to_vec(),
                    ParamType::Bytes => parse_hex_value(value)?,
                    _ => encode_value(&ty, value)?,
                };
                let topic = if ty.is_dynamic()
                    || matches!(ty, ParamType::Tuple(_) | ParamType::FixedArray(..))
                {
                    keccak256(&encoded)
                } else {
                    let mut word = [0u8; 32];
                    word.copy_from_slice(&encoded[..32]);
                    word
                };
                topics.push(topic);
            } else {
                data_types.push(ty);
                data_values.push(value.clone());
            }
        }

        Ok(RawLog {
            address,
            topics,
            data: encode(&data_types, &data_values)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomError {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
}

impl Abi {
    /// Parse a JSON ABI array
    pub fn from_json(value: Value) -> ChainResult<Self> {
        serde_json::from_value(value).map_err(|e| abi_err(format!("invalid ABI: {e}")))
    }

    pub fn items(&self) -> &[AbiItem] {
        &self.items
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            AbiItem::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.items.iter().filter_map(|item| match item {
            AbiItem::Event(e) => Some(e),
            _ => None,
        })
    }

    /// Look up a function by name, preferring the overload taking `arg_count` arguments
    pub fn function(&self, name: &str, arg_count: usize) -> Option<&Function> {
        let mut candidates = self.functions().filter(|f| f.name == name).peekable();
        let first = candidates.peek().copied();
        candidates
            .find(|f| f.inputs.len() == arg_count)
            .or(first)
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.items.iter().find_map(|item| match item {
            AbiItem::Constructor(c) => Some(c),
            _ => None,
        })
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events().find(|e| e.name == name)
    }

    /// Decode a log if its topic0 matches one of this ABI's events
    ///
    /// Returns `None` for logs that belong to no known event.
    pub fn decode_log(&self, log: &RawLog) -> Option<ChainResult<DecodedLog>> {
        let topic0 = log.topics.first()?;
        let event = self
            .events()
            .filter(|e| !e.anonymous)
            .find(|e| e.topic().map(|t| &t == topic0).unwrap_or(false))?;
        Some(event.decode_log(log))
    }

    /// Render revert data of a custom error declared in this ABI
    pub fn decode_error(&self, data: &[u8]) -> Option<String> {
        if data.len() < 4 {
            return None;
        }
        self.items.iter().find_map(|item| {
            let AbiItem::Error(err) = item else {
                return None;
            };
            let sig = signature(&err.name, &err.inputs).ok()?;
            let hash = keccak256(sig.as_bytes());
            if hash[..4] != data[..4] {
                return None;
            }
            let types = param_types(&err.inputs).ok()?;
            let values = decode(&types, &data[4..]).ok()?;
            let rendered: Vec<String> = values.iter().map(render_value).collect();
            Some(format!("{}({})", err.name, rendered.join(", ")))
        })
    }
}

/// Extract the human-readable message from revert data
///
/// Understands `Error(string)` and `Panic(uint256)` payloads.
pub fn decode_revert(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);
    if selector == ERROR_STRING_SELECTOR {
        return match decode(&[ParamType::String], payload).ok()?.pop()? {
            Value::String(s) => Some(s),
            _ => None,
        };
    }
    if selector == PANIC_SELECTOR {
        if payload.len() < 32 {
            return None;
        }
        let code = U256::from_big_endian(&payload[..32]);
        return Some(format!("panic: {} (0x{:02x})", panic_description(code), code.low_u64()));
    }
    None
}

fn panic_description(code: U256) -> &'static str {
    match code.low_u64() {
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum conversion",
        0x22 => "corrupted storage byte array",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to zero-initialized function",
        _ => "unknown panic",
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn signature(name: &str, inputs: &[Param]) -> ChainResult<String> {
    let types = param_types(inputs)?;
    let canonical: Vec<String> = types.iter().map(ParamType::canonical).collect();
    Ok(format!("{}({})", name, canonical.join(",")))
}

fn param_types(params: &[Param]) -> ChainResult<Vec<ParamType>> {
    params.iter().map(Param::param_type).collect()
}

/// Solidity parameter types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint(usize),
    Int(usize),
    Bool,
    String,
    Bytes,
    FixedBytes(usize),
    Array(Box<ParamType>),
    FixedArray(Box<ParamType>, usize),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Parse a JSON ABI type string (`uint256`, `bytes32[]`, `tuple[2]`, ...)
    pub fn parse(kind: &str, components: &[Param]) -> ChainResult<Self> {
        if let Some(stripped) = kind.strip_suffix(']') {
            let open = stripped
                .rfind('[')
                .ok_or_else(|| abi_err(format!("malformed array type '{kind}'")))?;
            let inner = Box::new(Self::parse(&stripped[..open], components)?);
            let size = &stripped[open + 1..];
            return if size.is_empty() {
                Ok(Self::Array(inner))
            } else {
                let n = size
                    .parse()
                    .map_err(|_| abi_err(format!("malformed array size in '{kind}'")))?;
                Ok(Self::FixedArray(inner, n))
            };
        }

        match kind {
            "address" => Ok(Self::Address),
            "bool" => Ok(Self::Bool),
            "string" => Ok(Self::String),
            "bytes" => Ok(Self::Bytes),
            "uint" => Ok(Self::Uint(256)),
            "int" => Ok(Self::Int(256)),
            "tuple" => Ok(Self::Tuple(param_types(components)?)),
            _ => {
                let sized = |prefix: &str, max: usize, step: usize| -> Option<usize> {
                    let n: usize = kind.strip_prefix(prefix)?.parse().ok()?;
                    (n > 0 && n <= max && n % step == 0).then_some(n)
                };
                if let Some(bits) = sized("uint", 256, 8) {
                    Ok(Self::Uint(bits))
                } else if let Some(bits) = sized("int", 256, 8) {
                    Ok(Self::Int(bits))
                } else if let Some(size) = sized("bytes", 32, 1) {
                    Ok(Self::FixedBytes(size))
                } else {
                    Err(abi_err(format!("unsupported ABI type '{kind}'")))
                }
            }
        }
    }

    pub fn canonical(&self) -> String {
        match self {
            Self::Address => "address".to_string(),
            Self::Uint(bits) => format!("uint{bits}"),
            Self::Int(bits) => format!("int{bits}"),
            Self::Bool => "bool".to_string(),
            Self::String => "string".to_string(),
            Self::Bytes => "bytes".to_string(),
            Self::FixedBytes(size) => format!("bytes{size}"),
            Self::Array(inner) => format!("{}[]", inner.canonical()),
            Self::FixedArray(inner, n) => format!("{}[{}]", inner.canonical(), n),
            Self::Tuple(types) => {
                let inner: Vec<String> = types.iter().map(Self::canonical).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes | Self::String | Self::Array(_) => true,
            Self::FixedArray(inner, _) => inner.is_dynamic(),
            Self::Tuple(types) => types.iter().any(Self::is_dynamic),
            _ => false,
        }
    }

    /// Size of this type in the head of an enclosing tuple
    fn head_length(&self) -> usize {
        match self {
            Self::FixedArray(inner, n) if !self.is_dynamic() => inner.head_length() * n,
            Self::Tuple(types) if !self.is_dynamic() => types.iter().map(Self::head_length).sum(),
            _ => 32,
        }
    }
}

// === Encoding ===

/// ABI-encode `values` as a tuple of `types`
pub fn encode(types: &[ParamType], values: &[Value]) -> ChainResult<Vec<u8>> {
    if types.len() != values.len() {
        return Err(abi_err(format!(
            "expected {} arguments, got {}",
            types.len(),
            values.len()
        )));
    }

    let head_size: usize = types.iter().map(ParamType::head_length).sum();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for (ty, value) in types.iter().zip(values) {
        let encoded = encode_value(ty, value)?;
        if ty.is_dynamic() {
            head.extend(usize_word(head_size + tail.len()));
            tail.extend(encoded);
        } else {
            head.extend(encoded);
        }
    }

    head.extend(tail);
    Ok(head)
}

fn encode_value(ty: &ParamType, value: &Value) -> ChainResult<Vec<u8>> {
    match ty {
        ParamType::Address => {
            let addr: Address = value
                .as_str()
                .ok_or_else(|| abi_err(format!("expected address string, got {value}")))?
                .parse()?;
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(addr.as_bytes());
            Ok(word.to_vec())
        }
        ParamType::Uint(_) => Ok(u256_word(parse_uint(value)?).to_vec()),
        ParamType::Int(_) => Ok(u256_word(parse_int(value)?).to_vec()),
        ParamType::Bool => {
            let b = match value {
                Value::Bool(b) => *b,
                Value::String(s) if s == "true" => true,
                Value::String(s) if s == "false" => false,
                _ => return Err(abi_err(format!("expected bool, got {value}"))),
            };
            let mut word = [0u8; 32];
            word[31] = u8::from(b);
            Ok(word.to_vec())
        }
        ParamType::FixedBytes(size) => {
            let bytes = parse_hex_value(value)?;
            if bytes.len() > *size {
                return Err(abi_err(format!(
                    "bytes{size} value is {} bytes long",
                    bytes.len()
                )));
            }
            let mut word = [0u8; 32];
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(word.to_vec())
        }
        ParamType::Bytes => Ok(encode_dynamic_bytes(&parse_hex_value(value)?)),
        ParamType::String => {
            let s = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(encode_dynamic_bytes(s.as_bytes()))
        }
        ParamType::Array(inner) => {
            let items = expect_array(value)?;
            let types = vec![(**inner).clone(); items.len()];
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode(&types, items)?);
            Ok(out)
        }
        ParamType::FixedArray(inner, n) => {
            let items = expect_array(value)?;
            if items.len() != *n {
                return Err(abi_err(format!(
                    "expected {} array elements, got {}",
                    n,
                    items.len()
                )));
            }
            encode(&vec![(**inner).clone(); *n], items)
        }
        ParamType::Tuple(types) => encode(types, expect_array(value)?),
    }
}

fn expect_array(value: &Value) -> ChainResult<&[Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| abi_err(format!("expected array, got {value}")))
}

fn encode_dynamic_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = usize_word(bytes.len()).to_vec();
    out.extend_from_slice(bytes);
    let padded = bytes.len().div_ceil(32) * 32;
    out.resize(32 + padded, 0);
    out
}

fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn usize_word(n: usize) -> [u8; 32] {
    u256_word(U256::from(n))
}

/// Parse an unsigned integer from a JSON number, decimal string or 0x-hex string
pub fn parse_uint(value: &Value) -> ChainResult<U256> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| abi_err(format!("expected unsigned integer, got {n}"))),
        Value::String(s) => parse_uint_str(s),
        other => Err(abi_err(format!("expected unsigned integer, got {other}"))),
    }
}

pub fn parse_uint_str(s: &str) -> ChainResult<U256> {
    let s = s.trim();
    let parsed = if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        U256::from_str_radix(hex_digits, 16).ok()
    } else {
        U256::from_dec_str(s).ok()
    };
    parsed.ok_or_else(|| abi_err(format!("invalid unsigned integer '{s}'")))
}

/// Parse a signed integer into its two's complement 256-bit representation
fn parse_int(value: &Value) -> ChainResult<U256> {
    let (negative, magnitude) = match value {
        Value::Number(n) => {
            let i = n
                .as_i64()
                .ok_or_else(|| abi_err(format!("expected integer, got {n}")))?;
            (i < 0, U256::from(i.unsigned_abs()))
        }
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix('-') {
                Some(rest) => (true, parse_uint_str(rest)?),
                None => (false, parse_uint_str(s)?),
            }
        }
        other => return Err(abi_err(format!("expected integer, got {other}"))),
    };
    if negative {
        Ok((!magnitude).overflowing_add(U256::one()).0)
    } else {
        Ok(magnitude)
    }
}

fn parse_hex_value(value: &Value) -> ChainResult<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| abi_err(format!("expected 0x-prefixed hex string, got {value}")))?;
    hex::decode(s.trim_start_matches("0x")).map_err(|e| abi_err(format!("invalid hex '{s}': {e}")))
}

// === Decoding ===

/// Decode ABI-encoded `data` as a tuple of `types`
pub fn decode(types: &[ParamType], data: &[u8]) -> ChainResult<Vec<Value>> {
    decode_sequence(types, data, 0)
}

/// Decode a tuple whose encoding starts at `start`
fn decode_sequence(types: &[ParamType], data: &[u8], start: usize) -> ChainResult<Vec<Value>> {
    let mut offset = start;
    let mut values = Vec::with_capacity(types.len());
    for ty in types {
        let (value, consumed) = decode_value(ty, data, start, offset)?;
        values.push(value);
        offset += consumed;
    }
    Ok(values)
}

/// Decode one value whose head sits at `offset`
///
/// Dynamic offsets are relative to `base`, the start of the enclosing tuple.
/// Returns the value and the number of head bytes consumed.
fn decode_value(
    ty: &ParamType,
    data: &[u8],
    base: usize,
    offset: usize,
) -> ChainResult<(Value, usize)> {
    match ty {
        ParamType::Address => {
            let word = read_word(data, offset)?;
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&word[12..]);
            Ok((Value::String(Address::from_bytes(bytes).to_string()), 32))
        }
        ParamType::Uint(_) => {
            let n = U256::from_big_endian(read_word(data, offset)?);
            Ok((Value::String(n.to_string()), 32))
        }
        ParamType::Int(_) => {
            let word = read_word(data, offset)?;
            let raw = U256::from_big_endian(word);
            let rendered = if word[0] & 0x80 != 0 {
                let magnitude = (!raw).overflowing_add(U256::one()).0;
                format!("-{magnitude}")
            } else {
                raw.to_string()
            };
            Ok((Value::String(rendered), 32))
        }
        ParamType::Bool => {
            let word = read_word(data, offset)?;
            Ok((Value::Bool(word[31] != 0), 32))
        }
        ParamType::FixedBytes(size) => {
            let word = read_word(data, offset)?;
            Ok((Value::String(format!("0x{}", hex::encode(&word[..*size]))), 32))
        }
        ParamType::Bytes => {
            let start = base + read_usize(data, offset)?;
            let bytes = read_dynamic_bytes(data, start)?;
            Ok((Value::String(format!("0x{}", hex::encode(bytes))), 32))
        }
        ParamType::String => {
            let start = base + read_usize(data, offset)?;
            let bytes = read_dynamic_bytes(data, start)?;
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| abi_err(format!("invalid UTF-8 in string: {e}")))?;
            Ok((Value::String(s), 32))
        }
        ParamType::Array(inner) => {
            let start = base + read_usize(data, offset)?;
            let len = read_usize(data, start)?;
            // Every element occupies at least one word
            check_length(data, start + 32 + len.saturating_mul(32))?;
            let types = vec![(**inner).clone(); len];
            let values = decode_sequence(&types, data, start + 32)?;
            Ok((Value::Array(values), 32))
        }
        ParamType::FixedArray(inner, n) => {
            let types = vec![(**inner).clone(); *n];
            decode_composite(ty, &types, data, base, offset)
        }
        ParamType::Tuple(types) => decode_composite(ty, types, data, base, offset),
    }
}

fn decode_composite(
    ty: &ParamType,
    types: &[ParamType],
    data: &[u8],
    base: usize,
    offset: usize,
) -> ChainResult<(Value, usize)> {
    if ty.is_dynamic() {
        let start = base + read_usize(data, offset)?;
        Ok((Value::Array(decode_sequence(types, data, start)?), 32))
    } else {
        Ok((
            Value::Array(decode_sequence(types, data, offset)?),
            ty.head_length(),
        ))
    }
}

fn read_word(data: &[u8], offset: usize) -> ChainResult<&[u8]> {
    check_length(data, offset + 32)?;
    Ok(&data[offset..offset + 32])
}

fn read_usize(data: &[u8], offset: usize) -> ChainResult<usize> {
    let n = U256::from_big_endian(read_word(data, offset)?);
    if n > U256::from(u32::MAX) {
        return Err(abi_err(format!("offset or length {n} out of range")));
    }
    Ok(n.low_u64() as usize)
}

fn read_dynamic_bytes(data: &[u8], start: usize) -> ChainResult<&[u8]> {
    let len = read_usize(data, start)?;
    check_length(data, start + 32 + len)?;
    Ok(&data[start + 32..start + 32 + len])
}

fn check_length(data: &[u8], required: usize) -> ChainResult<()> {
    if data.len() < required {
        return Err(abi_err(format!(
            "insufficient data: need {} bytes, have {}",
            required,
            data.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage_abi() -> Abi {
        Abi::from_json(json!([
            {"type": "constructor", "inputs": [{"name": "initialValue", "type": "uint256"}], "stateMutability": "nonpayable"},
            {"type": "function", "name": "getValue", "inputs": [], "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view"},
            {"type": "function", "name": "setValue", "inputs": [{"name": "newValue", "type": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "event", "name": "ValueChanged", "anonymous": false, "inputs": [
                {"name": "oldValue", "type": "uint256", "indexed": false},
                {"name": "newValue", "type": "uint256", "indexed": false},
                {"name": "changedBy", "type": "address", "indexed": true}
            ]},
            {"type": "error", "name": "NotOwner", "inputs": [{"name": "caller", "type": "address"}]},
            {"type": "receive", "stateMutability": "payable"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_abi_items() {
        let abi = storage_abi();
        assert_eq!(abi.items().len(), 6);
        assert!(abi.constructor().is_some());
        assert!(abi.function("getValue", 0).unwrap().is_read_only());
        assert!(!abi.function("setValue", 1).unwrap().is_read_only());
        assert!(abi.function("missing", 0).is_none());
    }

    #[test]
    fn test_well_known_selectors() {
        let abi = Abi::from_json(json!([
            {"type": "function", "name": "transfer", "inputs": [
                {"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}
            ], "outputs": [{"name": "", "type": "bool"}], "stateMutability": "nonpayable"}
        ]))
        .unwrap();
        let transfer = abi.function("transfer", 2).unwrap();
        assert_eq!(transfer.signature().unwrap(), "transfer(address,uint256)");
        assert_eq!(transfer.selector().unwrap(), [0xa9, 0x05, 0x9c, 0xbb]);

        let error_sig = keccak256(b"Error(string)");
        assert_eq!(error_sig[..4], ERROR_STRING_SELECTOR);
    }

    #[test]
    fn test_parse_types() {
        assert_eq!(ParamType::parse("uint", &[]).unwrap(), ParamType::Uint(256));
        assert_eq!(ParamType::parse("int8", &[]).unwrap(), ParamType::Int(8));
        assert_eq!(ParamType::parse("bytes32", &[]).unwrap(), ParamType::FixedBytes(32));
        assert_eq!(
            ParamType::parse("uint256[][3]", &[]).unwrap(),
            ParamType::FixedArray(Box::new(ParamType::Array(Box::new(ParamType::Uint(256)))), 3)
        );
        assert!(ParamType::parse("uint7", &[]).is_err());
        assert!(ParamType::parse("bytes33", &[]).is_err());
        assert!(ParamType::parse("function", &[]).is_err());
    }

    #[test]
    fn test_encode_uint_and_address() {
        let types = [ParamType::Address, ParamType::Uint(256)];
        let encoded = encode(
            &types,
            &[json!("0x00000000000000000000000000000000000000ff"), json!("100")],
        )
        .unwrap();
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 0xff);
        assert_eq!(encoded[63], 100);
    }

    #[test]
    fn test_encode_negative_int() {
        let encoded = encode(&[ParamType::Int(256)], &[json!(-1)]).unwrap();
        assert!(encoded.iter().all(|b| *b == 0xff));
        let decoded = decode(&[ParamType::Int(256)], &encoded).unwrap();
        assert_eq!(decoded, vec![json!("-1")]);
    }

    #[test]
    fn test_decode_dynamic_mix() {
        let types = [
            ParamType::String,
            ParamType::Uint(256),
            ParamType::Array(Box::new(ParamType::Bool)),
        ];
        let values = [json!("hello"), json!(7), json!([true, false])];
        let decoded = decode(&types, &encode(&types, &values).unwrap()).unwrap();
        assert_eq!(decoded, vec![json!("hello"), json!("7"), json!([true, false])]);
    }

    #[test]
    fn test_decode_insufficient_data() {
        assert!(decode(&[ParamType::Uint(256)], &[0u8; 16]).is_err());
    }

    #[test]
    fn test_event_log_decoding_preserves_declaration_order() {
        let abi = storage_abi();
        let event = abi.event("ValueChanged").unwrap();
        let sender = Address::from_low_u64(7);
        let log = event
            .encode_log(
                Address::from_low_u64(1),
                &[json!("42"), json!("100"), json!(sender.to_string())],
            )
            .unwrap();
        assert_eq!(log.topics.len(), 2);
        assert_eq!(log.data.len(), 64);

        let decoded = abi.decode_log(&log).unwrap().unwrap();
        assert_eq!(decoded.name, "ValueChanged");
        assert_eq!(
            decoded.args,
            vec![
                ("oldValue".to_string(), json!("42")),
                ("newValue".to_string(), json!("100")),
                ("changedBy".to_string(), json!(sender.to_string())),
            ]
        );
    }

    #[test]
    fn test_unknown_log_is_skipped() {
        let abi = storage_abi();
        let log = RawLog {
            address: Address::ZERO,
            topics: vec![[0xab; 32]],
            data: Vec::new(),
        };
        assert!(abi.decode_log(&log).is_none());
    }

    #[test]
    fn test_decode_revert_error_string() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(encode(&[ParamType::String], &[json!("Only owner can reset")]).unwrap());
        assert_eq!(decode_revert(&data).as_deref(), Some("Only owner can reset"));
    }

    #[test]
    fn test_decode_revert_panic() {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend(encode(&[ParamType::Uint(256)], &[json!(17)]).unwrap());
        assert_eq!(
            decode_revert(&data).as_deref(),
            Some("panic: arithmetic overflow or underflow (0x11)")
        );
        assert!(decode_revert(&[0x01, 0x02]).is_none());
    }

    #[test]
    fn test_decode_custom_error() {
        let abi = storage_abi();
        let hash = keccak256(b"NotOwner(address)");
        let mut data = hash[..4].to_vec();
        data.extend(
            encode(&[ParamType::Address], &[json!(Address::from_low_u64(2).to_string())]).unwrap(),
        );
        assert_eq!(
            abi.decode_error(&data).as_deref(),
            Some("NotOwner(0x0000000000000000000000000000000000000002)")
        );
    }

    #[test]
    fn test_function_output_roundtrip() {
        let abi = storage_abi();
        let get_value = abi.function("getValue", 0).unwrap();
        let encoded = get_value.encode_output(&json!("42")).unwrap();
        assert_eq!(get_value.decode_output(&encoded).unwrap(), json!("42"));
    }
}
