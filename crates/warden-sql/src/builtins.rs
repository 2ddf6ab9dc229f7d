//! Read-only PostgreSQL builtins that may appear in validated queries.

use warden_core::SortedFunctionList;

/// Aggregates, window functions and scalar helpers without side effects.
///
/// Entries are global (they match under any schema) and must stay sorted.
pub static POSTGRES_SAFE_FUNCTIONS: SortedFunctionList = SortedFunctionList::new(&[
    "abs", "age", "array_agg", "array_length", "array_position",
    "array_to_string", "ascii", "avg", "bit_and", "bit_length", "bit_or",
    "bool_and", "bool_or", "btrim", "cardinality", "cbrt", "ceil", "ceiling",
    "char_length", "character_length", "chr", "clock_timestamp", "coalesce",
    "concat", "concat_ws", "corr", "count", "covar_pop", "covar_samp",
    "cume_dist", "current_date", "current_time", "current_timestamp",
    "date_bin", "date_part", "date_trunc", "degrees", "dense_rank", "div",
    "every", "exp", "first_value", "floor", "greatest", "initcap", "isfinite",
    "json_agg", "json_array_length", "json_build_array", "json_build_object",
    "json_extract_path", "json_extract_path_text", "json_object_agg",
    "json_typeof", "jsonb_agg", "jsonb_array_length", "jsonb_build_array",
    "jsonb_build_object", "jsonb_extract_path", "jsonb_extract_path_text",
    "jsonb_object_agg", "jsonb_typeof", "justify_days", "justify_hours",
    "justify_interval", "lag", "last_value", "lead", "least", "left", "length",
    "ln", "localtime", "localtimestamp", "log", "log10", "lower", "lpad",
    "ltrim", "make_date", "make_time", "make_timestamp", "max", "md5", "min",
    "mod", "mode", "now", "nth_value", "ntile", "nullif", "octet_length",
    "percent_rank", "percentile_cont", "percentile_disc", "pi", "power",
    "radians", "rank", "regexp_match", "regexp_replace", "repeat", "replace",
    "reverse", "right", "round", "row_number", "rpad", "rtrim", "sign",
    "split_part", "sqrt", "starts_with", "statement_timestamp", "stddev",
    "stddev_pop", "stddev_samp", "string_agg", "string_to_array", "strpos",
    "substr", "substring", "sum", "to_char", "to_date", "to_json", "to_jsonb",
    "to_number", "to_timestamp", "transaction_timestamp", "translate", "trunc",
    "upper", "var_pop", "var_samp", "variance", "width_bucket",
]);
