use snowbox::{ExecutionRequest, Target};

#[test]
fn it_should_default_to_the_standard_limits() {
  let request = ExecutionRequest::new(Target::Cpp, "/tmp/snow");

  assert_eq!(request.time_limit_ms(), 2000);
  assert_eq!(request.memory_limit_kb(), 262144);
  assert_eq!(request.processes(), 64);
  assert_eq!(request.hostname(), "snowbox");
  assert!(request.stdin().is_none());
}

#[test]
fn it_should_carry_only_an_explicit_minimal_environment() {
  let request = ExecutionRequest::new(Target::Cpp, "/tmp/snow");
  let keys: Vec<&str> = request.envs().iter().map(|(key, _)| key.as_str()).collect();

  assert_eq!(keys, vec!["PATH", "PS1"]);
}

#[test]
fn it_should_absolutize_a_relative_root() {
  let request = ExecutionRequest::new(Target::Cpp, "some/rootfs");
  assert!(request.root().is_absolute());
}

#[test]
fn it_should_parse_language_tags_and_paths() {
  assert_eq!(Target::parse("cpp"), Target::Cpp);
  assert_eq!(Target::parse("java"), Target::Java);
  assert_eq!(
    Target::parse("/bin/echo"),
    Target::Command("/bin/echo".into())
  );
}

#[test]
fn it_should_resolve_cpp_to_the_fixed_solution_binary() {
  let request = ExecutionRequest::new(Target::Cpp, "/tmp/snow");
  let (program, arguments) = request.command();

  assert_eq!(program, "/solution");
  assert!(arguments.is_empty());
}

#[test]
fn it_should_cap_the_java_heap_at_the_memory_ceiling() {
  let request = ExecutionRequest::new(Target::Java, "/tmp/snow").memory_limit(131072);
  let (program, arguments) = request.command();

  assert_eq!(program, "java");
  assert_eq!(arguments, vec!["-Xmx131072k", "Solution"]);
}

#[test]
fn it_should_pass_arguments_to_an_explicit_program() {
  let request =
    ExecutionRequest::new(Target::parse("/bin/echo"), "/tmp/snow").arguments(vec!["hi"]);
  let (program, arguments) = request.command();

  assert_eq!(program, "/bin/echo");
  assert_eq!(arguments, vec!["hi"]);
}

#[test]
fn it_should_override_the_cgroup_base() {
  let request = ExecutionRequest::new(Target::Cpp, "/tmp/snow").cgroup("snowbox-test");
  assert_eq!(request.cgroup_base(), "snowbox-test");
}
