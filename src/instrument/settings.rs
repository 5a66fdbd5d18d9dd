/// Configuration of the instrumentation passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Names of the methods to instrument (every method with code if empty)
    pub methods: Vec<String>,

    /// Class declaring the static `PrintStream` field traces are printed to, written as
    /// `java/lang/System`
    pub trace_class: String,

    /// Name of the static `PrintStream` field (eg. `out`)
    pub trace_field: String,
}

impl Settings {
    /// Descriptor of the field named by `trace_class` and `trace_field`
    pub const TRACE_FIELD_DESCRIPTOR: &'static str = "Ljava/io/PrintStream;";

    pub fn new(methods: Vec<String>, trace_class: String, trace_field: String) -> Settings {
        Settings {
            methods,
            trace_class,
            trace_field,
        }
    }

    /// Should the method with this name be instrumented?
    pub fn selects(&self, method_name: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|name| name == method_name)
    }
}

/// Trace every method through `System.out`
impl Default for Settings {
    fn default() -> Settings {
        Settings::new(
            vec![],
            String::from("java/lang/System"),
            String::from("out"),
        )
    }
}
