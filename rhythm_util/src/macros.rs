#[macro_export]
macro_rules! opt {
    (, $default:ident) => {
        $default
    };
    ($optional:expr, $default:ident) => {
        $optional
    };
}

#[macro_export]
macro_rules! params_internal {
    ($vec:ident, required, $key:expr, $val:expr) => {
        $vec.push(($key, $val.to_string()));
    };
    ($vec:ident, optional, $key:expr, $val:expr) => {
        if let Some(ref v) = $val {
            $vec.push(($key, v.to_string()));
        }
    };
    // PostgREST column filter: `column=op.value`
    ($vec:ident, filter, $key:expr, $val:expr) => {
        let (op, v) = $val;
        $vec.push(($key, format!("{}.{}", op, v)));
    };
    ($vec:ident, filter_opt, $key:expr, $val:expr) => {
        if let Some((ref op, ref v)) = $val {
            $vec.push(($key, format!("{}.{}", op, v)));
        }
    };
    // `in.(a,b,c)` list filter
    ($vec:ident, any_of, $key:expr, $val:expr) => {
        let joined = $val.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        $vec.push(($key, format!("in.({})", joined)));
    };
}

/// Builds query params for the REST endpoints of the backend.
/// Each entry names a param and how to render it:
/// ```ignore
/// let params = build_params! {
///     required select => "id,title",
///     filter status => ("eq", "approved"),
///     filter_opt created_at => since.map(|s| ("gte", s)),
///     any_of post_id => ids,
///     optional limit,
/// };
/// ```
#[macro_export]
macro_rules! build_params {
    (
        $(
            $kind:ident $name:ident $( => $val:expr )?
        ),+ $(,)?
    ) => {
        {
            let mut params: Vec<(String, String)> = Vec::new();
            $(
                $crate::params_internal!(
                    params,
                    $kind,
                    stringify!($name).to_string(),
                    $crate::opt!($( $val )?, $name)
                );
            )+
            params
        }
    };
}

#[cfg(test)]
mod test {
    #[test]
    fn test_build_params() {
        let limit: Option<u32> = Some(10);
        let offset: Option<u32> = None;
        let ids = vec!["a", "b"];
        let since: Option<(&str, &str)> = None;
        let params = build_params! {
            required select => "id,title",
            filter status => ("eq", "approved"),
            filter_opt created_at => since,
            any_of post_id => ids,
            optional limit,
            optional offset,
        };
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "id,title".to_string()),
                ("status".to_string(), "eq.approved".to_string()),
                ("post_id".to_string(), "in.(a,b)".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }
}
