//! # node 模块说明
//!
//! ## 角色定位（Why）
//! - `Node` 是原生值与 JSON 字节之间的唯一中间形态，编码器与解码器只需与它打交道；
//! - 数值保真是核心诉求：`Integer` 覆盖 64 位有符号范围，更大的整数与无法用 `f64` 表达的
//!   小数以 [`Digits`] 原样携带十进制文本，永不经过浮点。
//!
//! ## 设计要求（What）
//! - [`Pairs`] 保留插入顺序，并为每个条目同时记录声明名与线上名；
//! - `Map` 使用 `BTreeMap`，编码输出按键排序，便于比对与缓存。

use std::collections::BTreeMap;
use std::fmt;

use crate::json::JsonCodec;

/// 无序（按键排序输出）的对象节点。
pub type Map = BTreeMap<String, Node>;

/// 与 JSON 值一一对应的树形节点。
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Node {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Digits(Digits),
    String(String),
    List(Vec<Node>),
    Pairs(Pairs),
    Map(Map),
}

impl Node {
    /// 节点种类名，用于错误信息。
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Nil => "null",
            Node::Bool(_) => "bool",
            Node::Integer(_) => "integer",
            Node::Float(_) => "float",
            Node::Digits(_) => "digits",
            Node::String(_) => "string",
            Node::List(_) => "list",
            Node::Pairs(_) | Node::Map(_) => "object",
        }
    }

    /// 是否为 `null`。
    pub fn is_nil(&self) -> bool {
        matches!(self, Node::Nil)
    }

    /// 是否为对象，`Pairs` 与 `Map` 都算。
    pub fn is_object(&self) -> bool {
        matches!(self, Node::Pairs(_) | Node::Map(_))
    }

    /// 布尔值视图。
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// `Integer` 的值；`Digits` 与 `Float` 不做转换。
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Integer(value) => Some(*value),
            Node::Digits(digits) => digits.to_i128().and_then(|wide| i64::try_from(wide).ok()),
            _ => None,
        }
    }

    /// 字符串内容，非字符串返回 `None`。
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(text) => Some(text),
            _ => None,
        }
    }

    /// 列表元素切片。
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// 按线上名查找对象成员；`Pairs` 与 `Map` 均适用。
    pub fn get(&self, wire: &str) -> Option<&Node> {
        match self {
            Node::Pairs(pairs) => pairs.find(wire),
            Node::Map(map) => map.get(wire),
            _ => None,
        }
    }

    /// 遍历对象成员 `(线上名, 值)`；非对象返回 `None`。
    ///
    /// `Pairs` 按插入顺序遍历，`Map` 按键序遍历。
    pub fn entries(&self) -> Option<Entries<'_>> {
        match self {
            Node::Pairs(pairs) => Some(Entries::Pairs(pairs.0.iter())),
            Node::Map(map) => Some(Entries::Map(map.iter())),
            _ => None,
        }
    }

    /// 由 128 位整数构造节点：64 位范围内为 `Integer`，否则为 `Digits`。
    pub fn from_i128(value: i128) -> Node {
        match i64::try_from(value) {
            Ok(narrow) => Node::Integer(narrow),
            Err(_) => Node::Digits(Digits(value.to_string())),
        }
    }

    /// 无符号版本的 [`Node::from_i128`]。
    pub fn from_u128(value: u128) -> Node {
        match i64::try_from(value) {
            Ok(narrow) => Node::Integer(narrow),
            Err(_) => Node::Digits(Digits(value.to_string())),
        }
    }
}

impl fmt::Display for Node {
    /// 紧凑 JSON 文本。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&JsonCodec::default().encode_to_string(self))
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Integer(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Float(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_owned())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<Digits> for Node {
    fn from(value: Digits) -> Self {
        Node::Digits(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::List(value)
    }
}

impl From<Pairs> for Node {
    fn from(value: Pairs) -> Self {
        Node::Pairs(value)
    }
}

impl From<Map> for Node {
    fn from(value: Map) -> Self {
        Node::Map(value)
    }
}

/// 对象成员迭代器。
pub enum Entries<'a> {
    Pairs(std::slice::Iter<'a, Pair>),
    Map(std::collections::btree_map::Iter<'a, String, Node>),
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a str, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Entries::Pairs(iter) => iter.next().map(|pair| (pair.wire.as_str(), &pair.value)),
            Entries::Map(iter) => iter.next().map(|(key, value)| (key.as_str(), value)),
        }
    }
}

/// 十进制数字文本。
///
/// # 教案式说明
/// - **意图 (Why)**：承载超出 `i64` 的整数以及 `f64` 无法表达的数字，保证编码输出与输入
///   逐字一致。
/// - **契约 (What)**：内部文本总是满足 JSON 数字文法（可选负号、无前导零的整数部分、
///   可选小数与指数），由 [`Digits::parse`] 校验；因此编码时可直接写出，无需转义或加引号。
/// - **执行逻辑 (How)**：转换为 `i128`/`u128` 时只接受纯整数文本；转换为 `f64` 走标准库解析，
///   结果可能有损，调用方自行决定是否接受。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Digits(String);

impl Digits {
    /// 校验并包装数字文本；不合法时返回 `None`。
    pub fn parse(text: &str) -> Option<Self> {
        match scan_number(text.as_bytes()) {
            Some(len) if len == text.len() => Some(Digits(text.to_owned())),
            _ => None,
        }
    }

    pub(crate) fn from_scanned(text: &str) -> Self {
        Digits(text.to_owned())
    }

    /// 原始数字文本。
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 是否为不含小数点与指数的整数文本。
    pub fn is_integral(&self) -> bool {
        !self.0.bytes().any(|b| matches!(b, b'.' | b'e' | b'E'))
    }

    /// 文本是否以 `-` 开头。
    pub fn is_negative(&self) -> bool {
        self.0.starts_with('-')
    }

    /// 按 `i128` 精确解读；含小数或越界时返回 `None`。
    pub fn to_i128(&self) -> Option<i128> {
        if !self.is_integral() {
            return None;
        }
        self.0.parse().ok()
    }

    /// 同 [`Digits::to_i128`]，但要求非负。
    pub fn to_u128(&self) -> Option<u128> {
        if !self.is_integral() || self.is_negative() {
            return None;
        }
        self.0.parse().ok()
    }

    /// 有损转换为 `f64`；超出范围时得到无穷大。
    pub fn to_f64(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Digits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for Digits {
    fn from(value: u64) -> Self {
        Digits(value.to_string())
    }
}

impl From<i128> for Digits {
    fn from(value: i128) -> Self {
        Digits(value.to_string())
    }
}

impl From<u128> for Digits {
    fn from(value: u128) -> Self {
        Digits(value.to_string())
    }
}

/// 扫描 JSON 数字文法，返回合法前缀的长度。
///
/// 文法：`-? (0 | [1-9][0-9]*) (\.[0-9]+)? ([eE][+-]?[0-9]+)?`。
pub(crate) fn scan_number(bytes: &[u8]) -> Option<usize> {
    let mut pos = 0;
    if bytes.first() == Some(&b'-') {
        pos += 1;
    }
    match bytes.get(pos) {
        Some(b'0') => pos += 1,
        Some(b'1'..=b'9') => {
            while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
                pos += 1;
            }
        }
        _ => return None,
    }
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        let start = pos;
        while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
            pos += 1;
        }
        if pos == start {
            return None;
        }
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        pos += 1;
        if matches!(bytes.get(pos), Some(b'+' | b'-')) {
            pos += 1;
        }
        let start = pos;
        while matches!(bytes.get(pos), Some(b'0'..=b'9')) {
            pos += 1;
        }
        if pos == start {
            return None;
        }
    }
    Some(pos)
}

/// 有序对象中的一个条目。
#[derive(Clone, Debug, PartialEq)]
pub struct Pair {
    /// 声明名（字段标识符或提升后的 `outer.inner`）。
    pub name: String,
    /// 线上名，即 JSON 中实际出现的键。
    pub wire: String,
    pub value: Node,
}

impl Pair {
    /// `name` 为声明名，`wire` 为线上名。
    pub fn new(name: impl Into<String>, wire: impl Into<String>, value: Node) -> Self {
        Self {
            name: name.into(),
            wire: wire.into(),
            value,
        }
    }
}

/// 保序对象。
///
/// 键查找按线上名进行；重复线上名允许存在，[`Pairs::find`] 返回第一个，
/// [`Pairs::into_map`] 以最后一个为准。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pairs(Vec<Pair>);

impl Pairs {
    /// 空对象。
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留 `capacity` 个条目。
    pub fn with_capacity(capacity: usize) -> Self {
        Pairs(Vec::with_capacity(capacity))
    }

    /// 按原样追加，不检查重复键。
    pub fn push(&mut self, pair: Pair) {
        self.0.push(pair);
    }

    /// 以线上名作为声明名追加条目，常用于解析得到的对象。
    pub fn push_wire(&mut self, wire: impl Into<String>, value: Node) {
        let wire = wire.into();
        self.0.push(Pair {
            name: wire.clone(),
            wire,
            value,
        });
    }

    /// 返回第一个线上名为 `wire` 的值。
    pub fn find(&self, wire: &str) -> Option<&Node> {
        self.0
            .iter()
            .find(|pair| pair.wire == wire)
            .map(|pair| &pair.value)
    }

    /// 条目数，重复键分别计数。
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 是否没有任何条目。
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按插入顺序遍历。
    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.0.iter()
    }

    /// 全部条目的切片。
    pub fn as_slice(&self) -> &[Pair] {
        &self.0
    }

    /// 转为按线上名索引的映射。
    pub fn into_map(self) -> Map {
        self.0
            .into_iter()
            .map(|pair| (pair.wire, pair.value))
            .collect()
    }
}

impl From<Vec<Pair>> for Pairs {
    fn from(pairs: Vec<Pair>) -> Self {
        Pairs(pairs)
    }
}

impl FromIterator<Pair> for Pairs {
    fn from_iter<I: IntoIterator<Item = Pair>>(iter: I) -> Self {
        Pairs(iter.into_iter().collect())
    }
}

impl IntoIterator for Pairs {
    type Item = Pair;
    type IntoIter = std::vec::IntoIter<Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Pairs {
    type Item = &'a Pair;
    type IntoIter = std::slice::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
