///
/// values!
///
/// Build a [`Values`](crate::factory::Values) map in place:
///
/// ```ignore
/// let values = values! {
///     "name" => "prod",
///     "replicas" => 3,
/// };
/// ```
///

#[macro_export]
macro_rules! values {
    () => {
        $crate::factory::Values::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut values = $crate::factory::Values::new();
        $(
            values.insert(($name).to_string(), $crate::value::Value::from($value));
        )+
        values
    }};
}
