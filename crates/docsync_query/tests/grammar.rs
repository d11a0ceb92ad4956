//! End-to-end tests for the query grammar.

use docsync_query::{compile, GrammarError, QueryCompiler};
use proptest::prelude::*;
use serde_json::{json, Value};

fn native(query: &str) -> Value {
    compile(query)
        .unwrap_or_else(|e| panic!("{query:?} failed: {e}"))
        .to_json()
}

fn filter(query: &str) -> Value {
    json!({ "filter": native(query)["filter"].clone() })
}

#[test]
fn equality_and_coercion() {
    assert_eq!(native("foo=bar"), json!({ "filter": { "foo": { "$eq": "bar" } } }));
    assert_eq!(native("foo=10"), json!({ "filter": { "foo": { "$eq": 10 } } }));
    assert_eq!(native("foo=true"), json!({ "filter": { "foo": { "$eq": true } } }));
    assert_eq!(native("foo=false"), json!({ "filter": { "foo": { "$eq": false } } }));
}

#[test]
fn repeated_keys() {
    assert_eq!(
        native("foo=bar&foo=10"),
        json!({ "filter": { "foo": { "$in": ["bar", 10] } } })
    );
    assert_eq!(
        native("foo!=bar&foo!=10"),
        json!({ "filter": { "foo": { "$nin": ["bar", 10] } } })
    );
    assert_eq!(
        native("foo:=10&foo:=baz"),
        json!({ "filter": { "foo": { "$in": ["10", "baz"] } } })
    );
}

#[test]
fn comparison_operators() {
    assert_eq!(filter("foo!=bar"), json!({ "filter": { "foo": { "$ne": "bar" } } }));
    assert_eq!(filter("foo>=bar"), json!({ "filter": { "foo": { "$gte": "bar" } } }));
    assert_eq!(filter("foo<=bar"), json!({ "filter": { "foo": { "$lte": "bar" } } }));
    assert_eq!(filter("foo>bar"), json!({ "filter": { "foo": { "$gt": "bar" } } }));
    assert_eq!(filter("foo<bar"), json!({ "filter": { "foo": { "$lt": "bar" } } }));
}

#[test]
fn duplicate_criteria_are_rejected() {
    for query in [
        "foo>=bar&foo>=baz",
        "foo<=bar&foo<=baz",
        "foo>bar&foo>baz",
        "foo<bar&foo<baz",
        "foo~=bar&foo~=baz",
        "foo^=bar&foo^=baz",
        "foo$=bar&foo$=baz",
    ] {
        assert!(compile(query).is_err(), "{query} should fail");
    }
}

#[test]
fn strict_bound_message() {
    let err = compile("foo>bar&foo>baz").unwrap_err();
    assert_eq!(
        err.to_string(),
        "query cannot contain more than one 'greater than' criteria for the same key"
    );
}

#[test]
fn existence() {
    assert_eq!(native("foo"), json!({ "filter": { "foo": { "$exists": true } } }));
    assert_eq!(native("!foo"), json!({ "filter": { "foo": { "$exists": false } } }));
    assert_eq!(native("!"), json!({ "filter": { "_id": { "$exists": false } } }));
}

#[test]
fn text_operators() {
    assert_eq!(
        native("foo~=bar"),
        json!({ "filter": { "foo": { "$regex": "bar", "$options": "i" } } })
    );
    assert_eq!(
        native("foo^=bar"),
        json!({ "filter": { "foo": { "$regex": "^bar", "$options": "i" } } })
    );
    assert_eq!(
        native("foo$=bar"),
        json!({ "filter": { "foo": { "$regex": "bar$", "$options": "i" } } })
    );
}

#[test]
fn distinct_text_operators_combine() {
    assert_eq!(
        native("foo~=a&foo^=b"),
        json!({ "filter": { "$and": [
            { "foo": { "$regex": "a", "$options": "i" } },
            { "foo": { "$regex": "^b", "$options": "i" } },
        ]}})
    );
    assert!(compile("foo~=a&foo^=b&foo$=c").is_ok());

    let descriptor = compile("name~=lph&name^=al&name$=ha").unwrap();
    assert!(descriptor.filter.matches(&json!({ "name": "Alpha" })));
    assert!(!descriptor.filter.matches(&json!({ "name": "Alphabet" })));
}

#[test]
fn forced_formats() {
    assert_eq!(native("foo:=10"), json!({ "filter": { "foo": { "$eq": "10" } } }));
    assert_eq!(
        native("foo@=Dec 1 2019"),
        json!({ "filter": { "foo": { "$eq": 1_575_158_400_000_i64 } } })
    );
    assert_eq!(
        native("foo@=Dec 1 2019&foo@=Jan 10 2018"),
        json!({ "filter": { "foo": { "$in": [1_575_158_400_000_i64, 1_515_542_400_000_i64] } } })
    );
    assert_eq!(native("foo@=1000"), json!({ "filter": { "foo": { "$eq": 1000 } } }));
}

#[test]
fn invalid_dates() {
    assert_eq!(compile("foo@=abc").unwrap_err(), GrammarError::InvalidDate);
    assert_eq!(
        compile("foo@=abc").unwrap_err().to_string(),
        "invalid date format in query string"
    );
    assert!(compile("foo@=abc&foo=Dec 1 2019").is_err());
}

#[test]
fn pagination() {
    assert_eq!(native("$limit=10"), json!({ "limit": 10, "filter": {} }));
    assert_eq!(compile("$limit=abc").unwrap_err(), GrammarError::InvalidLimit);
    assert_eq!(compile("$limit=0").unwrap_err(), GrammarError::InvalidLimit);
    assert_eq!(native("$skip=10"), json!({ "skip": 10, "filter": {} }));
    assert_eq!(native("$skip=0"), json!({ "skip": 0, "filter": {} }));
    assert_eq!(compile("$skip=abc").unwrap_err(), GrammarError::InvalidSkip);
    assert_eq!(compile("$skip=-1").unwrap_err(), GrammarError::InvalidSkip);
}

#[test]
fn count() {
    assert_eq!(native("$count"), json!({ "count": true, "filter": {} }));
    assert_eq!(native("$count=true"), json!({ "count": true, "filter": {} }));
    assert_eq!(native("$count=FALSE"), json!({ "count": false, "filter": {} }));
    assert_eq!(compile("$count=abc").unwrap_err(), GrammarError::InvalidCount);
}

#[test]
fn projection() {
    assert_eq!(
        native("$fields=abc,-def"),
        json!({ "fields": { "abc": 1, "def": 0 }, "filter": {} })
    );
    assert!(compile("$fields=abc,").is_err());
    assert!(compile("$fields=abc,-").is_err());
}

#[test]
fn sort() {
    assert_eq!(
        native("$sort=abc,-def"),
        json!({ "sort": [["abc", 1], ["def", -1]], "filter": {} })
    );
    assert_eq!(native("$sort=abc"), json!({ "sort": { "abc": 1 }, "filter": {} }));
    assert!(compile("$sort=abc,").is_err());
    assert!(compile("$sort=abc,-").is_err());
}

#[test]
fn embed_and_unknown_meta() {
    assert_eq!(
        native("$embed=abc,def"),
        json!({ "embed": ["abc", "def"], "filter": {} })
    );
    assert_eq!(native("$unknown"), json!({ "unknown": true, "filter": {} }));
    assert_eq!(
        native("$unknown=abc,def"),
        json!({ "unknown": "abc,def", "filter": {} })
    );
}

#[test]
fn or_clauses() {
    assert_eq!(
        native("a=b|c=d&$limit=2"),
        json!({
            "limit": 2,
            "filter": { "$or": [{ "a": { "$eq": "b" } }, { "c": { "$eq": "d" } }] },
        })
    );
}

#[test]
fn configured_identity_field() {
    let compiler = QueryCompiler::new().with_identity_field("uuid");
    assert_eq!(
        compiler.compile("!").unwrap().to_json(),
        json!({ "filter": { "uuid": { "$exists": false } } })
    );
}

#[test]
fn compiled_filters_evaluate() {
    let doc = json!({ "_id": "1", "name": "Alpha", "rank": 3, "tags": ["x", "y"] });
    let matches = |q: &str| compile(q).unwrap().filter.matches(&doc);

    assert!(matches(""));
    assert!(matches("name^=al"));
    assert!(matches("rank>2&rank<=3"));
    assert!(matches("tags=y"));
    assert!(matches("rank=9|name~=PH"));
    assert!(!matches("rank>3"));
    assert!(!matches("!name"));
    assert!(!matches("rank:=3"));
}

proptest! {
    #[test]
    fn compile_never_panics(raw in ".{0,64}") {
        let _ = compile(&raw);
    }

    #[test]
    fn integers_coerce_to_numbers(n in any::<i64>()) {
        let descriptor = compile(&format!("n={n}")).unwrap();
        prop_assert_eq!(descriptor.to_json()["filter"]["n"]["$eq"].clone(), json!(n));
    }

    #[test]
    fn positive_limits_round_trip(n in 1u64..u64::MAX) {
        prop_assert_eq!(compile(&format!("$limit={n}")).unwrap().limit, Some(n));
    }

    #[test]
    fn plain_words_stay_strings(word in "[a-z]{1,12}") {
        prop_assume!(word != "true" && word != "false" && word != "inf" && word != "infinity" && word != "nan");
        let descriptor = compile(&format!("w={word}")).unwrap();
        prop_assert_eq!(descriptor.to_json()["filter"]["w"]["$eq"].clone(), json!(word));
    }
}
