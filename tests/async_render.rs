//! The cooperative-async render path mirrors the synchronous one.

use brine::{DictLoader, Environment, Error, Filter, FilterArgs, RenderContext, Value};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn render_async_matches_sync() {
    let template = brine::parse(
        "{% for n in (1..3) %}{{ n }}{% endfor %} {{ 'a' if x else 'b' | upcase }}",
    )
    .unwrap();

    let sync = template.render_json(json!({"x": false})).unwrap();
    let async_ = template.render_json_async(json!({"x": false})).await.unwrap();
    assert_eq!(sync, async_);
    assert_eq!(async_, "123 B");
}

#[tokio::test]
async fn async_partials() {
    let env = Environment::new().with_loader(DictLoader::new([
        ("header", "Hello, {{ you }}."),
    ]));
    let template = env
        .from_string("{% include 'header' %}|{% render 'header' %}")
        .unwrap();
    assert_eq!(
        template
            .render_json_async(json!({"you": "World"}))
            .await
            .unwrap(),
        "Hello, World.|Hello, World."
    );
}

#[tokio::test]
async fn get_template_async() {
    let env = Environment::new().with_loader(DictLoader::new([("page", "hi")]));
    let template = env.get_template_async("page").await.unwrap();
    assert_eq!(template.render_async(Default::default()).await.unwrap(), "hi");
}

/// A filter whose async variant suspends before shouting.
#[derive(Debug)]
struct ShoutFilter;

impl Filter for ShoutFilter {
    fn call(
        &self,
        input: Value,
        _args: &FilterArgs,
        _ctx: &mut RenderContext<'_>,
        _span: brine::Span,
    ) -> Result<Value, Error> {
        Ok(Value::from(
            brine::to_liquid_string(&input, false).to_uppercase(),
        ))
    }

    fn call_async<'a, 'env: 'a>(
        &'a self,
        input: Value,
        args: FilterArgs,
        ctx: &'a mut RenderContext<'env>,
        span: brine::Span,
    ) -> BoxFuture<'a, Result<Value, Error>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.call(input, &args, ctx, span)
        })
    }
}

#[tokio::test]
async fn user_async_filters_suspend() {
    let mut env = Environment::new();
    env.add_filter("shout", Arc::new(ShoutFilter));
    let template = env.from_string("{{ 'hi' | shout }}").unwrap();
    assert_eq!(template.render_json_async(json!({})).await.unwrap(), "HI");
}

#[tokio::test]
async fn analyze_async() {
    let template = brine::parse("{{ thing }}").unwrap();
    let analysis = template.analyze_async(false).await.unwrap();
    assert!(analysis.globals.contains_key("thing"));
}
