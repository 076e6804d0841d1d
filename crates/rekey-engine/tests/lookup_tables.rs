use rekey_core::{Value, row};
use rekey_engine::{
    Definition, ExecutionPlan, InsertWriter, Mapping, MemoryStore, NoProgress, Runner, VecSource,
};

fn articles(store: &MemoryStore) -> Definition {
    let mut articles = Definition::transform(
        "Articles",
        VecSource::new(vec![
            row([("sArticleId", Value::Int(10001)), ("strRef", "data-import-is-awesome".into())]),
            row([("sArticleId", Value::Int(20002)), ("strRef", "ruby-is-awesome".into())]),
            row([("sArticleId", Value::Int(66666)), ("strRef", Value::Null)]),
        ]),
        InsertWriter::new(store.table("articles")),
    );
    articles.lookup_for("sArticleId", None, false).unwrap();
    articles.lookup_for("reference", Some("strRef"), true).unwrap();
    articles
        .add_mapping(Mapping::rename("strRef", "slug"))
        .unwrap();
    articles
}

fn posts(store: &MemoryStore) -> Definition {
    let mut posts = Definition::transform(
        "Posts",
        VecSource::new(vec![
            row([
                ("sPostId", Value::Int(7)),
                ("sArticleId", Value::Int(20002)),
                ("strArticleRef", "data-import-is-awesome".into()),
            ]),
            row([
                ("sPostId", Value::Int(8)),
                ("sArticleId", Value::Int(10001)),
                ("strArticleRef", "ruby-IS-awesome".into()),
            ]),
            row([
                ("sPostId", Value::Int(9)),
                ("sArticleId", Value::Int(20002)),
                ("strArticleRef", "DATA-import-IS-awesome".into()),
            ]),
            row([
                ("sPostId", Value::Int(10)),
                ("sArticleId", Value::Null),
                ("strArticleRef", Value::Null),
            ]),
        ]),
        InsertWriter::new(store.table("posts")),
    );
    posts.add_dependency("Articles");
    posts.add_mapping(Mapping::rename("sPostId", "id")).unwrap();
    posts
        .add_mapping(Mapping::reference_by(
            "Articles",
            "sArticleId",
            "article_id",
            "sArticleId",
        ))
        .unwrap();
    posts
        .add_mapping(Mapping::reference_by(
            "Articles",
            "strArticleRef",
            "similar_article_id",
            "reference",
        ))
        .unwrap();
    posts
}

#[test]
fn references_resolve_through_named_lookups() {
    let store = MemoryStore::new();
    let mut plan = ExecutionPlan::new();
    plan.add_definition(posts(&store));
    plan.add_definition(articles(&store));

    Runner::new(&plan).with_progress(&NoProgress).run(None).unwrap();

    let posts = store.table("posts");
    let found: Vec<(Value, Value, Value)> = posts
        .borrow()
        .rows()
        .iter()
        .map(|post| {
            (
                post["id"].clone(),
                post["article_id"].clone(),
                post["similar_article_id"].clone(),
            )
        })
        .collect();
    assert_eq!(
        found,
        vec![
            (Value::Int(7), Value::Int(2), Value::Int(1)),
            (Value::Int(8), Value::Int(1), Value::Int(2)),
            (Value::Int(9), Value::Int(2), Value::Int(1)),
            (Value::Int(10), Value::Null, Value::Null),
        ]
    );
}

#[test]
fn scripts_write_rows_and_fill_their_own_lookups() {
    let store = MemoryStore::new();
    let mut plan = ExecutionPlan::new();
    plan.add_definition(articles(&store));

    let mut mark = Definition::script(
        "Mark ruby article",
        InsertWriter::new(store.table("marked_articles")),
    );
    mark.add_dependency("Articles");
    mark.set_body(|context, sink| {
        let ruby = context
            .definition("Articles")?
            .identify_by("reference", &Value::from("RUBY-is-awesome"))?
            .unwrap_or(Value::Null);
        let current = context.current();
        current.lookup_for("mark", None, false)?;
        let id = sink.write_row(&row([("article_id", ruby)]))?;
        current.row_imported(&id, &row([("mark", "ruby")]))?;
        Ok(())
    })
    .unwrap();
    plan.add_definition(mark);

    let mut comments = Definition::transform(
        "Comments",
        VecSource::new(vec![row([("strMark", "ruby")])]),
        InsertWriter::new(store.table("comments")),
    );
    comments.add_dependency("Mark ruby article");
    comments
        .add_mapping(Mapping::reference_by(
            "Mark ruby article",
            "strMark",
            "marked_article_id",
            "mark",
        ))
        .unwrap();
    plan.add_definition(comments);

    let report = Runner::new(&plan).with_progress(&NoProgress).run(None).unwrap();
    assert_eq!(report.order(), vec!["Articles", "Mark ruby article", "Comments"]);
    assert_eq!(report.definition("Mark ruby article").map(|d| d.kind.as_str()), Some("script"));

    let marked = store.table("marked_articles");
    assert_eq!(marked.borrow().rows()[0]["article_id"], Value::Int(2));
    let comments = store.table("comments");
    assert_eq!(
        comments.borrow().rows()[0]["marked_article_id"],
        Value::Int(1)
    );
}

#[test]
fn failing_scripts_roll_back_their_writes() {
    let store = MemoryStore::new();
    let mut plan = ExecutionPlan::new();
    let mut broken = Definition::script("Broken", InsertWriter::new(store.table("broken")));
    broken
        .set_body(|context, sink| {
            sink.write_row(&row([("note", "partial")]))?;
            context.definition("Nowhere")?;
            Ok(())
        })
        .unwrap();
    plan.add_definition(broken);

    assert!(Runner::new(&plan).with_progress(&NoProgress).run(None).is_err());
    assert!(store.table("broken").borrow().is_empty());
}
