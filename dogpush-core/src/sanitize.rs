use dogpush_metrics::MetricName;

/// Flattens `name` into a dotted wire key, inserting `path` segments before any
/// `[tag:value]` fragments carried by the metric name.
///
/// `{group: "com.app", type: "Requests", name: "latency[endpoint:/a]"}` with
/// path `["p99"]` becomes `com.app.Requests.latency.p99[endpoint:/a]`.
pub fn sanitize_name(name: &MetricName, path: &[&str]) -> String {
    let (base, tags) = split_tags(name.name());

    let mut out = String::with_capacity(
        name.group().len()
            + name.type_().len()
            + name.scope().map_or(0, |s| s.len() + 1)
            + name.name().len()
            + path.iter().map(|p| p.len() + 1).sum::<usize>()
            + 2,
    );

    out.push_str(name.group());
    out.push('.');
    out.push_str(name.type_());
    out.push('.');
    if let Some(scope) = name.scope() {
        out.push_str(scope);
        out.push('.');
    }

    out.push_str(base);
    for part in path {
        out.push('.');
        out.push_str(part);
    }

    // Every fragment after the first `[` keeps its own bracket, so the tail is
    // re-appended as is.
    out.push_str(tags);
    out
}

/// Splits at the first `[`; the second half keeps the bracket. Trailing `[`
/// open no fragment and are dropped.
fn split_tags(name: &str) -> (&str, &str) {
    match name.find('[') {
        Some(idx) => {
            let (base, tags) = name.split_at(idx);
            (base, tags.trim_end_matches('['))
        }
        None => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(group: &str, type_: &str, n: &str) -> MetricName {
        MetricName::new(group, type_, n).unwrap_or_else(|e| panic!("valid name: {e}"))
    }

    #[test]
    fn plain_name() {
        assert_eq!(sanitize_name(&name("web", "Hits", "total"), &[]), "web.Hits.total");
    }

    #[test]
    fn suffixes_go_before_tags() {
        let n = name("com.app", "Requests", "latency[endpoint:/a]");
        assert_eq!(
            sanitize_name(&n, &["p99"]),
            "com.app.Requests.latency.p99[endpoint:/a]"
        );
    }

    #[test]
    fn multiple_tags_keep_their_order() {
        let n = name("g", "T", "req[status:500][method:GET]");
        assert_eq!(
            sanitize_name(&n, &["1MinuteRate"]),
            "g.T.req.1MinuteRate[status:500][method:GET]"
        );
    }

    #[test]
    fn scope_is_inserted_when_present() {
        let n = name("g", "T", "n").with_scope("api");
        assert_eq!(sanitize_name(&n, &["min", "x"]), "g.T.api.n.min.x");

        let empty_scope = name("g", "T", "n").with_scope("");
        assert_eq!(sanitize_name(&empty_scope, &[]), "g.T..n");
    }

    #[test]
    fn odd_brackets_are_preserved_verbatim() {
        assert_eq!(sanitize_name(&name("g", "T", "[a:b]"), &["mean"]), "g.T..mean[a:b]");
        assert_eq!(sanitize_name(&name("g", "T", "n[[x"), &[]), "g.T.n[[x");
    }

    #[test]
    fn trailing_open_brackets_are_dropped() {
        assert_eq!(sanitize_name(&name("g", "T", "n["), &["max"]), "g.T.n.max");
        assert_eq!(sanitize_name(&name("g", "T", "a[b["), &["max"]), "g.T.a.max[b");
        assert_eq!(sanitize_name(&name("g", "T", "a[b[["), &[]), "g.T.a[b");
        assert_eq!(sanitize_name(&name("g", "T", "a[[x[["), &[]), "g.T.a[[x");
    }

    #[test]
    fn is_deterministic() {
        let n = name("g", "T", "n[k:v]").with_scope("s");
        let a = sanitize_name(&n, &["median"]);
        let b = sanitize_name(&n, &["median"]);
        assert_eq!(a, b);
    }
}
