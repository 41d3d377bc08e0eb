//! # json 模块说明
//!
//! ## 角色定位（Why）
//! - 在 [`Node`] 与 JSON 字节之间转换，且数字不会被提前折算：整数文本落入 `Integer`
//!   或 [`Digits`]；小数只有在 `f64` 的最短表示与源文本数值相同时才落入 `Float`，否则保留为 `Digits`；
//! - 解析器按游标逐字节推进，对象可选择解析为 `Map`（键序）或 `Pairs`（线上顺序）。
//!
//! ## 设计要求（What）
//! - 解析带深度上限，超限返回 `DepthExceeded`，不会因恶意嵌套耗尽调用栈；
//! - 字符串的转义解码委托 `serde_json`，覆盖代理对等全部细节；
//! - 编码输出为合法 JSON：非有限浮点写为 `null`，浮点总含小数点或指数，解码后仍为浮点。

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{DuetError, Result};
use crate::node::{Digits, Map, Node, Pairs, scan_number};
use crate::path::FieldPath;

/// 解析时对象节点的形态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectShape {
    /// 解析为 [`Node::Map`]，重复键以最后一次为准。
    #[default]
    Map,
    /// 解析为 [`Node::Pairs`]，保留线上顺序与重复键。
    Pairs,
}

/// JSON 编解码器。
///
/// # 教案式说明
/// - **意图 (Why)**：把字节层面的格式细节集中在一处，Schema 与 Binder 只处理 [`Node`]。
/// - **契约 (What)**：
///   - `encode` 永不失败，`Node` 中的一切形态都有合法的 JSON 表达；
///   - `decode` 要求输入恰好是一个 JSON 值（允许首尾空白），否则返回 `Malformed`；
///   - 缩进模式使用两个空格，与紧凑模式语义等价。
/// - **设计权衡 (Trade-offs)**：解析器不做流式增量，整段输入须已在内存中；对 RPC 载荷足够。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JsonCodec {
    indent: bool,
    objects: ObjectShape,
    max_depth: usize,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self {
            indent: false,
            objects: ObjectShape::Map,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl JsonCodec {
    /// 默认选项：紧凑输出、`Map` 形态、默认深度上限。
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启后以两个空格缩进输出。
    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// 选择对象解析形态。
    pub fn with_objects(mut self, objects: ObjectShape) -> Self {
        self.objects = objects;
        self
    }

    /// 解析时允许的最大嵌套层数。
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 是否缩进输出。
    pub fn indent(&self) -> bool {
        self.indent
    }

    /// 当前的对象解析形态。
    pub fn objects(&self) -> ObjectShape {
        self.objects
    }

    /// 解析深度上限。
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 把节点写成 UTF-8 字节；编码本身不会失败。
    pub fn encode(&self, node: &Node) -> Vec<u8> {
        self.encode_to_string(node).into_bytes()
    }

    /// 同 [`JsonCodec::encode`]，直接得到 `String`。
    pub fn encode_to_string(&self, node: &Node) -> String {
        let mut out = String::new();
        Writer {
            out: &mut out,
            indent: self.indent,
        }
        .write(node, 0);
        out
    }

    /// 解析一份完整的 JSON 文本，尾随非空白字符视为错误。
    pub fn decode(&self, input: &[u8]) -> Result<Node> {
        let mut parser = Parser {
            input,
            pos: 0,
            depth: 0,
            max_depth: self.max_depth,
            objects: self.objects,
        };
        parser.skip_whitespace();
        let node = parser.value()?;
        parser.skip_whitespace();
        if parser.pos != input.len() {
            return Err(parser.malformed("trailing characters after JSON value"));
        }
        Ok(node)
    }

    /// 从 `&str` 解析。
    pub fn decode_str(&self, input: &str) -> Result<Node> {
        self.decode(input.as_bytes())
    }
}

struct Writer<'a> {
    out: &'a mut String,
    indent: bool,
}

impl Writer<'_> {
    fn write(&mut self, node: &Node, level: usize) {
        match node {
            Node::Nil => self.out.push_str("null"),
            Node::Bool(true) => self.out.push_str("true"),
            Node::Bool(false) => self.out.push_str("false"),
            Node::Integer(value) => self.out.push_str(&value.to_string()),
            Node::Float(value) => self.float(*value),
            Node::Digits(digits) => self.out.push_str(digits.as_str()),
            Node::String(text) => self.string(text),
            Node::List(items) => {
                self.out.push('[');
                for (position, item) in items.iter().enumerate() {
                    self.separator(position, level + 1);
                    self.write(item, level + 1);
                }
                self.close(items.is_empty(), level, ']');
            }
            Node::Pairs(pairs) => {
                self.out.push('{');
                for (position, pair) in pairs.iter().enumerate() {
                    self.member(position, level, &pair.wire, &pair.value);
                }
                self.close(pairs.is_empty(), level, '}');
            }
            Node::Map(map) => {
                self.out.push('{');
                for (position, (key, value)) in map.iter().enumerate() {
                    self.member(position, level, key, value);
                }
                self.close(map.is_empty(), level, '}');
            }
        }
    }

    fn member(&mut self, position: usize, level: usize, key: &str, value: &Node) {
        self.separator(position, level + 1);
        self.string(key);
        self.out.push(':');
        if self.indent {
            self.out.push(' ');
        }
        self.write(value, level + 1);
    }

    fn separator(&mut self, position: usize, level: usize) {
        if position > 0 {
            self.out.push(',');
        }
        self.newline(level);
    }

    fn close(&mut self, empty: bool, level: usize, bracket: char) {
        if !empty {
            self.newline(level);
        }
        self.out.push(bracket);
    }

    fn newline(&mut self, level: usize) {
        if self.indent {
            self.out.push('\n');
            for _ in 0..level {
                self.out.push_str("  ");
            }
        }
    }

    fn float(&mut self, value: f64) {
        if !value.is_finite() {
            self.out.push_str("null");
            return;
        }
        // `{:?}` 给出最短可往返文本，且总带 `.` 或指数。
        self.out.push_str(&format!("{value:?}"));
    }

    fn string(&mut self, text: &str) {
        self.out.push('"');
        for ch in text.chars() {
            match ch {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                '\u{08}' => self.out.push_str("\\b"),
                '\u{0c}' => self.out.push_str("\\f"),
                ch if (ch as u32) < 0x20 => {
                    self.out.push_str(&format!("\\u{:04x}", ch as u32));
                }
                ch => self.out.push(ch),
            }
        }
        self.out.push('"');
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
    objects: ObjectShape,
}

impl Parser<'_> {
    fn malformed(&self, reason: impl Into<String>) -> DuetError {
        DuetError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.malformed(format!("expected '{}'", byte as char)))
        }
    }

    fn value(&mut self) -> Result<Node> {
        match self.peek() {
            None => Err(self.malformed("unexpected end of input")),
            Some(b'{') => self.object(),
            Some(b'[') => self.list(),
            Some(b'"') => self.string().map(Node::String),
            Some(b't') => self.literal("true", Node::Bool(true)),
            Some(b'f') => self.literal("false", Node::Bool(false)),
            Some(b'n') => self.literal("null", Node::Nil),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(other) => Err(self.malformed(format!("unexpected character '{}'", other as char))),
        }
    }

    fn literal(&mut self, word: &str, node: Node) -> Result<Node> {
        if self.input[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(node)
        } else {
            Err(self.malformed(format!("invalid literal, expected {word}")))
        }
    }

    fn number(&mut self) -> Result<Node> {
        let input = self.input;
        let rest = &input[self.pos..];
        let len = scan_number(rest).ok_or_else(|| self.malformed("invalid number"))?;
        // 数字文法只含 ASCII，切片必为合法 UTF-8。
        let text = std::str::from_utf8(&rest[..len]).map_err(|_| self.malformed("invalid number"))?;
        self.pos += len;
        let digits = Digits::from_scanned(text);
        if digits.is_integral() {
            return Ok(match text.parse::<i64>() {
                Ok(value) => Node::Integer(value),
                Err(_) => Node::Digits(digits),
            });
        }
        let value = digits.to_f64();
        Ok(if value.is_finite() && exactly_f64(text, value) {
            Node::Float(value)
        } else {
            Node::Digits(digits)
        })
    }

    fn string(&mut self) -> Result<String> {
        let start = self.pos;
        self.expect(b'"')?;
        loop {
            match self.peek() {
                None => return Err(self.malformed("unterminated string")),
                Some(b'"') => break,
                Some(b'\\') => self.pos += 2,
                Some(_) => self.pos += 1,
            }
        }
        self.pos += 1;
        let raw = &self.input[start..self.pos];
        serde_json::from_slice::<String>(raw).map_err(|error| DuetError::Malformed {
            offset: start,
            reason: format!("invalid string: {error}"),
        })
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(DuetError::DepthExceeded {
                path: FieldPath::root(),
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn list(&mut self) -> Result<Node> {
        self.enter()?;
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Node::List(items));
        }
        loop {
            self.skip_whitespace();
            items.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.malformed("expected ',' or ']' in list")),
            }
        }
        self.depth -= 1;
        Ok(Node::List(items))
    }

    fn object(&mut self) -> Result<Node> {
        self.enter()?;
        self.expect(b'{')?;
        let mut members: Vec<(String, Node)> = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
        } else {
            loop {
                self.skip_whitespace();
                if self.peek() != Some(b'"') {
                    return Err(self.malformed("expected string key"));
                }
                let key = self.string()?;
                self.skip_whitespace();
                self.expect(b':')?;
                self.skip_whitespace();
                let value = self.value()?;
                members.push((key, value));
                self.skip_whitespace();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b'}') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.malformed("expected ',' or '}' in object")),
                }
            }
        }
        self.depth -= 1;
        Ok(match self.objects {
            ObjectShape::Map => Node::Map(members.into_iter().collect::<Map>()),
            ObjectShape::Pairs => {
                let mut pairs = Pairs::with_capacity(members.len());
                for (key, value) in members {
                    pairs.push_wire(key, value);
                }
                Node::Pairs(pairs)
            }
        })
    }
}

/// 十进制文本的规范形式：`(负号, 去掉首尾零的有效数字, 十的幂次)`，零的有效数字为空。
fn decimal_form(text: &str) -> Option<(bool, String, i64)> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let raw: String = whole.chars().chain(fraction.chars()).collect();
    let significant = raw.trim_end_matches('0');
    let trailing = i64::try_from(raw.len() - significant.len()).ok()?;
    let shift = i64::try_from(fraction.len()).ok()?;
    let significant = significant.trim_start_matches('0');
    if significant.is_empty() {
        return Some((negative, String::new(), 0));
    }
    let scale = exponent.checked_sub(shift)?.checked_add(trailing)?;
    Some((negative, significant.to_owned(), scale))
}

/// 源文本与 `value` 的最短往返文本表示同一个十进制数时，`Float` 才不丢信息。
fn exactly_f64(text: &str, value: f64) -> bool {
    match decimal_form(text) {
        Some(source) => decimal_form(&format!("{value:?}")).as_ref() == Some(&source),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Pair;

    #[test]
    fn numbers_keep_their_precision_class() {
        let codec = JsonCodec::default();
        assert_eq!(codec.decode_str("42").expect("整数"), Node::Integer(42));
        assert_eq!(
            codec.decode_str("18446744073709551615").expect("u64 上界"),
            Node::Digits(Digits::from(u64::MAX))
        );
        assert_eq!(codec.decode_str("2.5").expect("小数"), Node::Float(2.5));
        let huge = codec.decode_str("1e400").expect("超范围小数");
        assert!(matches!(huge, Node::Digits(ref d) if d.as_str() == "1e400"));
    }

    #[test]
    fn fractions_beyond_f64_keep_their_source_text() {
        let codec = JsonCodec::default();
        for text in ["0.10000000000000000001", "1e-400", "-2.000000000000000000000001"] {
            let node = codec.decode_str(text).expect("合法数字");
            assert!(
                matches!(node, Node::Digits(ref d) if d.as_str() == text),
                "{text} 应保留为 Digits，实际为 {node:?}"
            );
            assert_eq!(codec.encode_to_string(&node), text, "重新编码与源文本一致");
        }
        for (text, value) in [("0.1", 0.1), ("3.00", 3.0), ("1.5e3", 1500.0), ("-0.0", -0.0)] {
            assert_eq!(codec.decode_str(text).expect("合法数字"), Node::Float(value), "{text}");
        }
    }

    #[test]
    fn floats_stay_floats_after_encoding() {
        let codec = JsonCodec::default();
        let text = codec.encode_to_string(&Node::Float(3.0));
        assert_eq!(text, "3.0");
        assert_eq!(codec.decode_str(&text).expect("回读"), Node::Float(3.0));
        assert_eq!(codec.encode_to_string(&Node::Float(f64::NAN)), "null");
    }

    #[test]
    fn pairs_shape_preserves_wire_order() {
        let codec = JsonCodec::default().with_objects(ObjectShape::Pairs);
        let node = codec.decode_str(r#"{"z":1,"a":2}"#).expect("对象");
        let Node::Pairs(pairs) = &node else {
            panic!("应解析为 Pairs");
        };
        let keys: Vec<_> = pairs.iter().map(|pair| pair.wire.as_str()).collect();
        assert_eq!(keys, ["z", "a"]);
        assert_eq!(codec.encode_to_string(&node), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn indent_layout_uses_two_spaces() {
        let mut pairs = Pairs::new();
        pairs.push(Pair::new("K", "k", Node::List(vec![Node::Integer(1)])));
        pairs.push(Pair::new("E", "e", Node::Map(Map::new())));
        let text = JsonCodec::default()
            .with_indent(true)
            .encode_to_string(&Node::Pairs(pairs));
        assert_eq!(text, "{\n  \"k\": [\n    1\n  ],\n  \"e\": {}\n}");
    }

    #[test]
    fn strings_escape_and_unescape_symmetrically() {
        let codec = JsonCodec::default();
        let original = Node::from("line\n\"quoted\"\u{01}\\ \u{1F600}");
        let text = codec.encode_to_string(&original);
        assert_eq!(codec.decode_str(&text).expect("回读"), original);
        assert_eq!(
            codec.decode_str(r#""\ud83d\ude00""#).expect("代理对"),
            Node::from("\u{1F600}")
        );
    }

    #[test]
    fn malformed_inputs_report_offsets() {
        let codec = JsonCodec::default();
        for bad in ["", "{", "[1,]", r#"{"a" 1}"#, "tru", "1 2", "01", r#""open"#] {
            let error = codec.decode_str(bad).expect_err(bad);
            assert!(
                matches!(error, DuetError::Malformed { .. }),
                "{bad:?} 应报告 Malformed，实际为 {error:?}"
            );
        }
    }

    #[test]
    fn nesting_beyond_limit_is_structural() {
        let codec = JsonCodec::default().with_max_depth(3);
        assert!(codec.decode_str("[[[1]]]").is_ok());
        let error = codec.decode_str("[[[[1]]]]").expect_err("超过深度");
        assert!(matches!(error, DuetError::DepthExceeded { limit: 3, .. }));
    }
}
