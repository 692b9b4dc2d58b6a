use snowbox::{
  Outcome, ResultRecord, STATUS_ACCEPTED, STATUS_MEMORY_LIMIT, STATUS_RUNTIME_ERROR,
  STATUS_TIME_LIMIT,
};

#[test]
fn it_should_number_the_status_codes_like_the_wire_contract() {
  assert_eq!(
    Outcome::Accepted {
      time: 1,
      memory: 1,
      output: String::new(),
    }
    .status(),
    STATUS_ACCEPTED
  );
  assert_eq!(
    Outcome::RuntimeError {
      detail: "x".to_string(),
    }
    .status(),
    STATUS_RUNTIME_ERROR
  );
  assert_eq!(Outcome::TimeLimitExceeded.status(), STATUS_TIME_LIMIT);
  assert_eq!(Outcome::MemoryLimitExceeded.status(), STATUS_MEMORY_LIMIT);
}

#[test]
fn it_should_omit_empty_fields_from_an_accepted_record() {
  let record = Outcome::Accepted {
    time: 12,
    memory: 1024,
    output: "hi".to_string(),
  }
  .into_record();
  let text = serde_json::to_string(&record).unwrap();

  assert_eq!(
    text,
    "{\"status\":0,\"time\":12,\"memory\":1024,\"output\":\"hi\"}"
  );
}

#[test]
fn it_should_carry_only_a_detail_for_limit_outcomes() {
  let record = Outcome::TimeLimitExceeded.into_record();
  assert_eq!(record.status, STATUS_TIME_LIMIT);
  assert_eq!(record.error.as_deref(), Some("Time Limit Exceeded"));
  assert_eq!(record.time, None);
  assert_eq!(record.memory, None);
  assert_eq!(record.output, None);
}

#[test]
fn it_should_parse_a_record_with_missing_optional_fields() {
  let record = serde_json::from_str::<ResultRecord>("{\"status\":1,\"error\":\"Runtime Error\"}")
    .unwrap();
  assert_eq!(record.status, STATUS_RUNTIME_ERROR);
  assert_eq!(record.error.as_deref(), Some("Runtime Error"));
  assert_eq!(record.output, None);
}

#[test]
fn it_should_round_trip_an_accepted_record() {
  let record = Outcome::Accepted {
    time: 3,
    memory: 800,
    output: "42".to_string(),
  }
  .into_record();
  let text = serde_json::to_string(&record).unwrap();
  let parsed = serde_json::from_str::<ResultRecord>(&text).unwrap();
  assert_eq!(parsed, record);
}

#[test]
fn it_should_summarize_each_category_in_one_line() {
  let accepted = Outcome::Accepted {
    time: 12,
    memory: 1024,
    output: "hi".to_string(),
  }
  .into_record();
  assert_eq!(accepted.summary(), "Accepted  time 12 ms  memory 1024 KB");

  let faulted = ResultRecord::runtime_error("exited with code 1");
  assert_eq!(faulted.summary(), "Runtime Error  (exited with code 1)");

  assert_eq!(
    Outcome::MemoryLimitExceeded.into_record().summary(),
    "Memory Limit Exceeded"
  );
}
