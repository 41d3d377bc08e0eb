//! duet 框架过程宏入口。
//!
//! # 设计意图（Why）
//! - Rust 没有运行时反射，`#[derive(Object)]` 在编译期为结构体生成字段清单，交给
//!   `duet_core::SchemaRegistry` 在首次使用时构建 Schema；
//! - 标签文本原样透传，解析与校验统一在运行时的 `FieldTag::classify` 中完成，保证宏与库对
//!   同一份标签只有一种解释。
//!
//! # 集成方式（How）
//! - `#[api("in,out,both,required,auth")]` 声明方向与标记；
//! - `#[enc("wire")]` 或 `#[serde(rename = "wire")]` 声明线上名，前者优先；
//! - `#[enc(skip)]`/`#[serde(skip)]` 排除字段，`#[enc(flatten)]`/`#[serde(flatten)]` 提升内嵌结构体的字段；
//! - 生成代码以 `::duet_core` 绝对路径引用运行时，调用方需直接依赖 `duet-core`。

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DataStruct, DeriveInput, Error, Field, Fields, LitStr, Token, ext::IdentExt,
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
    spanned::Spanned,
};

/// 为具名字段结构体生成 `Object`、`Encode` 与 `Decode` 实现。
///
/// # 语义说明（What）
/// - **输入**：仅接受无泛型参数、具名字段的结构体；
/// - **输出**：`declare` 按声明顺序登记每个字段（或内嵌结构体），`Encode`/`Decode` 委托给
///   上下文按 Schema 处理；
/// - **前置条件**：每个字段类型实现 `Encode + Decode`，内嵌字段类型实现 `Object`。
///
/// # 风险提示（Trade-offs）
/// - 未知的 `serde` 子项被忽略，以便与 `serde` 自身的派生共存；未知的 `enc` 子项则直接报错。
#[proc_macro_derive(Object, attributes(api, enc, serde))]
pub fn derive_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_object(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_object(input: DeriveInput) -> Result<TokenStream2, Error> {
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "#[derive(Object)] 暂不支持带泛型参数的类型",
        ));
    }

    let named = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(named),
            ..
        }) => &named.named,
        _ => {
            return Err(Error::new(
                input.ident.span(),
                "#[derive(Object)] 仅支持具名字段结构体",
            ));
        }
    };

    let mut declarations = Vec::with_capacity(named.len());
    for field in named {
        let spec = FieldSpec::parse(field)?;
        if spec.skip {
            continue;
        }
        declarations.push(spec.declaration()?);
    }

    let name = &input.ident;
    Ok(quote! {
        impl ::duet_core::schema::Object for #name {
            fn declare(fields: &mut ::duet_core::schema::FieldSet<Self>) {
                let _ = &fields;
                #(#declarations)*
            }
        }

        impl ::duet_core::codec::Encode for #name {
            fn encode(
                &self,
                cx: &mut ::duet_core::codec::EncodeContext<'_>,
            ) -> ::duet_core::error::Result<::duet_core::node::Node> {
                cx.encode_object(self)
            }
        }

        impl ::duet_core::codec::Decode for #name {
            fn decode_into(
                &mut self,
                node: &::duet_core::node::Node,
                cx: &mut ::duet_core::codec::DecodeContext<'_>,
            ) -> ::duet_core::error::Result<()> {
                cx.decode_object(self, node)
            }
        }
    })
}

/// 单个字段收集到的属性。
struct FieldSpec<'f> {
    field: &'f Field,
    api: String,
    enc: String,
    serde: String,
    skip: bool,
    flatten: bool,
}

/// `#[enc(...)]` 中的一项：线上名字符串，或 `skip`/`flatten` 标志。
enum EncItem {
    Name(LitStr),
    Flag(syn::Ident),
}

impl Parse for EncItem {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        if input.peek(LitStr) {
            input.parse().map(EncItem::Name)
        } else {
            input.call(syn::Ident::parse_any).map(EncItem::Flag)
        }
    }
}

impl<'f> FieldSpec<'f> {
    fn parse(field: &'f Field) -> Result<Self, Error> {
        let mut spec = FieldSpec {
            field,
            api: String::new(),
            enc: String::new(),
            serde: String::new(),
            skip: false,
            flatten: false,
        };

        for attr in &field.attrs {
            if attr.path().is_ident("api") {
                let tokens: LitStr = attr.parse_args()?;
                if !spec.api.is_empty() {
                    spec.api.push(',');
                }
                spec.api.push_str(&tokens.value());
            } else if attr.path().is_ident("enc") {
                let items =
                    attr.parse_args_with(Punctuated::<EncItem, Token![,]>::parse_terminated)?;
                for item in items {
                    match item {
                        EncItem::Name(name) => spec.enc = name.value(),
                        EncItem::Flag(flag) if flag == "skip" => spec.skip = true,
                        EncItem::Flag(flag) if flag == "flatten" => spec.flatten = true,
                        EncItem::Flag(flag) => {
                            return Err(Error::new(
                                flag.span(),
                                format!("#[enc] 不认识的选项 `{flag}`，可用：\"name\"、skip、flatten"),
                            ));
                        }
                    }
                }
            } else if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        if meta.input.peek(Token![=]) {
                            let name: LitStr = meta.value()?.parse()?;
                            spec.serde = name.value();
                        } else {
                            skip_nested(&meta)?;
                        }
                    } else if meta.path.is_ident("skip") {
                        spec.skip = true;
                    } else if meta.path.is_ident("flatten") {
                        spec.flatten = true;
                    } else {
                        skip_nested(&meta)?;
                    }
                    Ok(())
                })?;
            }
        }

        if spec.flatten && !spec.api.is_empty() {
            return Err(Error::new(
                field.span(),
                "内嵌（flatten）字段不接受 #[api]，请在内嵌类型的字段上声明",
            ));
        }
        Ok(spec)
    }

    fn declaration(&self) -> Result<TokenStream2, Error> {
        let Some(ident) = self.field.ident.as_ref() else {
            return Err(Error::new(self.field.span(), "具名字段缺少标识符"));
        };
        let ident_name = ident.unraw().to_string();
        let ty = &self.field.ty;

        if self.flatten {
            return Ok(quote! {
                fields.embed::<#ty>(#ident_name, |value| &value.#ident, |value| &mut value.#ident);
            });
        }

        let api = &self.api;
        let enc = &self.enc;
        let serde = &self.serde;
        Ok(quote! {
            fields.field::<#ty>(
                #ident_name,
                ::duet_core::tag::FieldAttrs { api: #api, enc: #enc, serde: #serde },
                |value| &value.#ident,
                |value| &mut value.#ident,
            );
        })
    }
}

/// 忽略与本宏无关的 `serde` 子项：`key = value` 或 `key(...)`。
fn skip_nested(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _: TokenStream2 = content.parse()?;
    }
    Ok(())
}
