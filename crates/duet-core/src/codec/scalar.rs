//! 标量类型的编解码。
//!
//! 整数统一经由 128 位中间值收窄：`i64` 范围内编码为 `Integer`，之外编码为 `Digits`；
//! 解码时 `Integer`/`Digits`/整值 `Float` 都可以作为来源，超出目标范围报告 `Overflow`。

use super::{Decode, DecodeContext, Encode, EncodeContext};
use crate::error::Result;
use crate::node::Node;

impl Encode for bool {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::Bool(*self))
    }
}

impl Decode for bool {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        *self = match node {
            Node::Nil => false,
            Node::Bool(flag) => *flag,
            other => return Err(cx.mismatch("bool", other)),
        };
        Ok(())
    }
}

impl Encode for str {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::String(self.to_owned()))
    }
}

impl Encode for String {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::String(self.clone()))
    }
}

impl Decode for String {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        match node {
            Node::Nil => self.clear(),
            Node::String(text) => text.clone_into(self),
            other => return Err(cx.mismatch("string", other)),
        }
        Ok(())
    }
}

/// 把节点读成 128 位有符号整数；`target` 仅用于错误信息。
fn signed_wide(node: &Node, cx: &DecodeContext<'_>, target: &'static str) -> Result<Option<i128>> {
    match node {
        Node::Nil => Ok(None),
        Node::Integer(value) => Ok(Some(i128::from(*value))),
        Node::Digits(digits) if digits.is_integral() => digits
            .to_i128()
            .map(Some)
            .ok_or_else(|| cx.overflow(target, digits.as_str())),
        Node::Float(value) => integral_float(*value, node, cx, target).map(Some),
        other => Err(cx.mismatch(target, other)),
    }
}

/// 无符号版本，覆盖 `u128` 全范围。
fn unsigned_wide(node: &Node, cx: &DecodeContext<'_>, target: &'static str) -> Result<Option<u128>> {
    match node {
        Node::Nil => Ok(None),
        Node::Integer(value) => u128::try_from(*value)
            .map(Some)
            .map_err(|_| cx.overflow(target, value.to_string())),
        Node::Digits(digits) if digits.is_integral() => digits
            .to_u128()
            .map(Some)
            .ok_or_else(|| cx.overflow(target, digits.as_str())),
        Node::Float(value) => {
            let wide = integral_float(*value, node, cx, target)?;
            u128::try_from(wide)
                .map(Some)
                .map_err(|_| cx.overflow(target, format!("{value:?}")))
        }
        other => Err(cx.mismatch(target, other)),
    }
}

/// 整值浮点（如 `3.0`）可以解码为整数，带小数部分的不行。
fn integral_float(value: f64, node: &Node, cx: &DecodeContext<'_>, target: &'static str) -> Result<i128> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(cx.mismatch(target, node));
    }
    if value.abs() >= 1.7e38 {
        return Err(cx.overflow(target, format!("{value:?}")));
    }
    Ok(value as i128)
}

macro_rules! signed_codec {
    ($($ty:ty),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
                Ok(Node::from_i128(i128::from(*self)))
            }
        }

        impl Decode for $ty {
            fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
                let target = stringify!($ty);
                *self = match signed_wide(node, cx, target)? {
                    None => 0,
                    Some(wide) => <$ty>::try_from(wide)
                        .map_err(|_| cx.overflow(target, wide.to_string()))?,
                };
                Ok(())
            }
        }
    )*};
}

macro_rules! unsigned_codec {
    ($($ty:ty),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
                Ok(Node::from_u128(u128::from(*self)))
            }
        }

        impl Decode for $ty {
            fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
                let target = stringify!($ty);
                *self = match unsigned_wide(node, cx, target)? {
                    None => 0,
                    Some(wide) => <$ty>::try_from(wide)
                        .map_err(|_| cx.overflow(target, wide.to_string()))?,
                };
                Ok(())
            }
        }
    )*};
}

signed_codec!(i8, i16, i32, i64, i128);
unsigned_codec!(u8, u16, u32, u64, u128);

impl Encode for isize {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::from_i128(*self as i128))
    }
}

impl Decode for isize {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        let mut wide = 0i64;
        wide.decode_into(node, cx)?;
        *self = isize::try_from(wide).map_err(|_| cx.overflow("isize", wide.to_string()))?;
        Ok(())
    }
}

impl Encode for usize {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::from_u128(*self as u128))
    }
}

impl Decode for usize {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        let mut wide = 0u64;
        wide.decode_into(node, cx)?;
        *self = usize::try_from(wide).map_err(|_| cx.overflow("usize", wide.to_string()))?;
        Ok(())
    }
}

fn float_wide(node: &Node, cx: &DecodeContext<'_>, target: &'static str) -> Result<f64> {
    match node {
        Node::Nil => Ok(0.0),
        Node::Float(value) => Ok(*value),
        Node::Integer(value) => Ok(*value as f64),
        Node::Digits(digits) => {
            let value = digits.to_f64();
            if value.is_finite() {
                Ok(value)
            } else {
                Err(cx.overflow(target, digits.as_str()))
            }
        }
        other => Err(cx.mismatch(target, other)),
    }
}

impl Encode for f64 {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::Float(*self))
    }
}

impl Decode for f64 {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        *self = float_wide(node, cx, "f64")?;
        Ok(())
    }
}

impl Encode for f32 {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        // 经由 f32 的最短文本转换，`0.1f32` 编码为 `0.1` 而非 `0.10000000149011612`。
        let widened = self.to_string().parse::<f64>().unwrap_or(f64::from(*self));
        Ok(Node::Float(widened))
    }
}

impl Decode for f32 {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        let wide = float_wide(node, cx, "f32")?;
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(cx.overflow("f32", format!("{wide:?}")));
        }
        *self = wide as f32;
        Ok(())
    }
}
