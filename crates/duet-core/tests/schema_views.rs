//! Schema 构建、内嵌提升与角色视图。
//!
//! # 教案式说明
//! - **意图 (Why)**：绑定层的所有行为都建立在“字段属于哪个视图”之上，标签解析、线上名选择与
//!   内嵌字段的冲突处理必须稳定可预期。
//! - **契约 (What)**：
//!   - 线上名优先级为 `enc` > `serde(rename)` > 字段名；
//!   - 未知标签记号在构建 Schema 时报错，错误信息指明类型、字段与记号；
//!   - 内嵌结构体的字段被提升到外层，同名冲突按配置拒绝或由最浅者胜出；
//!   - 未知字段默认忽略，严格模式下报告 `decode.unknown_field`；
//!   - 嵌套深度受 `max_depth` 约束。

use duet_core::{
    EmbedCollisions, JsonCodec, Node, Object, RegistryConfig, SchemaRegistry, UnknownFields, codes,
};

#[derive(Object, Clone, Debug, Default)]
struct Naming {
    #[enc("e")]
    #[serde(rename = "s")]
    from_enc: i32,
    #[serde(rename = "s2")]
    from_serde: i32,
    plain: i32,
    #[enc(skip)]
    hidden: i32,
}

#[derive(Object, Clone, Debug, Default)]
struct Sideways {
    #[api("in,sideways")]
    value: i32,
}

#[derive(Object, Clone, Debug, Default, PartialEq)]
struct Audit {
    #[api("out")]
    #[enc("created")]
    created: i64,
    #[api("in,out")]
    #[enc("id")]
    id: String,
}

#[derive(Object, Clone, Debug, Default, PartialEq)]
struct Stamp {
    #[api("out")]
    #[enc("created")]
    created: i64,
}

#[derive(Object, Clone, Debug, Default, PartialEq)]
struct Document {
    #[api("in")]
    #[enc("title")]
    title: String,
    #[enc(flatten)]
    stamp: Stamp,
}

#[derive(Object, Clone, Debug, Default, PartialEq)]
struct Record {
    #[api("in,out")]
    #[enc("id")]
    id: String,
    #[enc(flatten)]
    audit: Audit,
}

#[derive(Object, Clone, Debug, Default)]
struct Twins {
    #[enc(flatten)]
    left: Stamp,
    #[enc(flatten)]
    right: Stamp,
}

#[derive(Object, Clone, Debug, Default)]
struct Lookup {
    #[api("in,required")]
    #[enc("q")]
    query: String,
    #[api("out")]
    #[enc("r")]
    result: String,
    #[api("both")]
    #[enc("b")]
    page: u32,
    #[api("auth")]
    #[enc("user")]
    user: String,
    #[enc("note")]
    note: String,
}

fn wires<'a>(fields: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    fields.collect()
}

#[test]
fn wire_names_follow_enc_then_serde_then_ident() {
    let registry = SchemaRegistry::new();
    let schema = registry.schema::<Naming>().expect("合法 Schema");
    let names = wires(schema.fields().iter().map(|field| field.wire_name()));
    assert_eq!(names, ["e", "s2", "plain"], "skip 字段不进入 Schema");
}

#[test]
fn unknown_tag_token_fails_schema_construction() {
    let registry = SchemaRegistry::new();
    let error = registry.schema::<Sideways>().expect_err("非法记号");
    assert_eq!(error.code(), codes::SCHEMA_INVALID_TAG);
    let message = error.to_string();
    assert!(message.contains("Sideways.value"), "信息为 {message}");
    assert!(message.contains("\"sideways\""), "信息为 {message}");
    assert!(!registry.contains::<Sideways>(), "失败的构建不缓存");
}

#[test]
fn schemas_are_cached_per_type() {
    let registry = SchemaRegistry::new();
    let first = registry.schema::<Lookup>().expect("构建");
    let second = registry.clone().schema::<Lookup>().expect("命中缓存");
    assert!(std::sync::Arc::ptr_eq(&first, &second), "克隆的注册表共享缓存");
    assert!(registry.contains::<Lookup>());
}

#[test]
fn embedded_fields_are_promoted() {
    let registry = SchemaRegistry::new();
    let schema = registry.schema::<Document>().expect("合法 Schema");
    let names = wires(schema.fields().iter().map(|field| field.name()));
    assert_eq!(names, ["title", "stamp.created"]);
    assert_eq!(schema.field("created").map(|field| field.depth()), Some(1));
    assert_eq!(wires(schema.request_view().fields().map(|f| f.wire_name())), ["title"]);
    assert_eq!(wires(schema.response_view().fields().map(|f| f.wire_name())), ["created"]);

    let node = JsonCodec::default()
        .decode_str(r#"{"title":"t","created":42}"#)
        .expect("合法 JSON");
    let document: Document = registry.unmarshal(&node).expect("解码");
    assert_eq!(document.stamp.created, 42);

    let text = String::from_utf8(registry.to_json(&document, &JsonCodec::default()).expect("编码"))
        .expect("UTF-8");
    assert_eq!(text, r#"{"title":"t","created":42}"#, "提升字段平铺在外层");
}

#[test]
fn embed_collisions_are_rejected_by_default() {
    let registry = SchemaRegistry::new();
    let error = registry.schema::<Record>().expect_err("默认拒绝冲突");
    assert_eq!(error.code(), codes::SCHEMA_FIELD_COLLISION);
    let message = error.to_string();
    assert!(message.contains("\"id\""), "信息为 {message}");
    assert!(message.contains("audit.id"), "信息为 {message}");
}

#[test]
fn shallowest_field_wins_when_configured() {
    let config = RegistryConfig::default().with_embed_collisions(EmbedCollisions::ShallowestWins);
    let registry = SchemaRegistry::with_config(config).expect("合法配置");
    let schema = registry.schema::<Record>().expect("最浅者胜出");
    let names = wires(schema.fields().iter().map(|field| field.name()));
    assert_eq!(names, ["id", "audit.created"]);

    let node = JsonCodec::default()
        .decode_str(r#"{"id":"outer","created":1}"#)
        .expect("合法 JSON");
    let record: Record = registry.unmarshal(&node).expect("解码");
    assert_eq!(record.id, "outer");
    assert_eq!(record.audit.id, "", "被遮蔽的内嵌字段不再接收数据");
    assert_eq!(record.audit.created, 1);
}

#[test]
fn equal_depth_collisions_fail_under_every_policy() {
    let config = RegistryConfig::default().with_embed_collisions(EmbedCollisions::ShallowestWins);
    let registry = SchemaRegistry::with_config(config).expect("合法配置");
    let error = registry.schema::<Twins>().expect_err("同深度冲突无法裁决");
    assert_eq!(error.code(), codes::SCHEMA_FIELD_COLLISION);
}

#[test]
fn role_views_partition_fields() {
    let registry = SchemaRegistry::new();
    let schema = registry.schema::<Lookup>().expect("合法 Schema");

    let wire = |field: &duet_core::Field<Lookup>| field.wire_name().to_owned();
    let request: Vec<String> = schema.request_view().fields().map(wire).collect();
    let response: Vec<String> = schema.response_view().fields().map(wire).collect();
    let auth: Vec<String> = schema.auth_view().fields().map(wire).collect();
    let payload: Vec<String> = schema.payload_view().fields().map(wire).collect();
    let all: Vec<String> = schema.full_view().fields().map(wire).collect();

    assert_eq!(request, ["q", "b"]);
    assert_eq!(response, ["r", "b"]);
    assert_eq!(auth, ["user"]);
    assert_eq!(payload, ["q", "b"]);
    assert_eq!(all, ["q", "r", "b", "user", "note"], "完整视图包含未标注方向的字段");
    assert!(!schema.request_view().contains("note"));
    assert!(schema.field("q").is_some_and(|field| field.tag().is_required()));
}

#[test]
fn unknown_fields_are_ignored_unless_strict() {
    let node = JsonCodec::default()
        .decode_str(r#"{"q":"x","surprise":1}"#)
        .expect("合法 JSON");

    let lenient = SchemaRegistry::new();
    let lookup: Lookup = lenient.unmarshal(&node).expect("默认忽略未知字段");
    assert_eq!(lookup.query, "x");

    let strict = SchemaRegistry::with_config(
        RegistryConfig::default().with_unknown_fields(UnknownFields::Reject),
    )
    .expect("合法配置");
    let error = strict.unmarshal::<Lookup>(&node).expect_err("严格模式拒绝");
    assert_eq!(error.code(), codes::DECODE_UNKNOWN_FIELD);
    assert_eq!(error.path().map(ToString::to_string).as_deref(), Some("surprise"));
}

#[test]
fn nesting_depth_is_bounded() {
    let registry =
        SchemaRegistry::with_config(RegistryConfig::default().with_max_depth(2)).expect("合法配置");
    let node = Node::List(vec![Node::List(vec![Node::List(vec![Node::Integer(1)])])]);

    let shallow: Vec<Vec<i32>> = registry
        .unmarshal(&Node::List(vec![Node::List(vec![Node::Integer(1)])]))
        .expect("两层以内可以解码");
    assert_eq!(shallow, vec![vec![1]]);

    let error = registry
        .unmarshal::<Vec<Vec<Vec<i32>>>>(&node)
        .expect_err("超过深度上限");
    assert_eq!(error.code(), codes::STRUCTURE_DEPTH_EXCEEDED);

    let error = JsonCodec::default()
        .with_max_depth(2)
        .decode_str("[[[1]]]")
        .expect_err("解析器同样受限");
    assert_eq!(error.code(), codes::STRUCTURE_DEPTH_EXCEEDED);
}

#[test]
fn zero_depth_configuration_is_rejected() {
    let error = SchemaRegistry::with_config(RegistryConfig::default().with_max_depth(0))
        .expect_err("深度为零无意义");
    assert_eq!(error.code(), codes::CONFIG_INVALID);
}

#[test]
fn configuration_loads_from_toml() {
    let config: RegistryConfig = toml::from_str(
        r#"
        unknown_fields = "reject"
        embed_collisions = "shallowest_wins"
        max_depth = 16
        "#,
    )
    .expect("合法 TOML");
    assert_eq!(config.unknown_fields, UnknownFields::Reject);
    assert_eq!(config.embed_collisions, EmbedCollisions::ShallowestWins);
    assert_eq!(config.max_depth, 16);

    let partial: RegistryConfig = toml::from_str("max_depth = 8").expect("其余字段取默认值");
    assert_eq!(partial, RegistryConfig::default().with_max_depth(8));

    assert!(
        toml::from_str::<RegistryConfig>("mystery = true").is_err(),
        "未知配置项直接拒绝"
    );
}
