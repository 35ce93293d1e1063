use crmpilot_llm::{Content, Message, Tool, ToolCall, ToolChoice};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_message_roles_serialize_as_chat_roles() {
    let messages = vec![
        Message::system("You are a data steward."),
        Message::human("Update 3 accounts"),
        Message::ai("Done."),
        Message::tool_result("call_1", "ok"),
    ];

    let roles: Vec<String> = messages
        .iter()
        .map(|m| serde_json::to_value(m).unwrap()["role"].as_str().unwrap().to_string())
        .collect();

    assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
    assert_eq!(messages[2].role(), "assistant");
}

#[test]
fn test_message_deserializes_part_content() {
    let raw = json!({
        "role": "user",
        "content": [{"type": "text", "text": "first"}, {"type": "text", "text": "second"}]
    });

    let message: Message = serde_json::from_value(raw).unwrap();
    assert_eq!(message.text(), "first\nsecond");
}

#[test]
fn test_assistant_with_only_tool_calls() {
    let message = Message::ai_with_tools(None, vec![ToolCall::new("call_9", "get_data", "")]);

    assert_eq!(message.text(), "");
    assert_eq!(message.tool_calls().len(), 1);
    assert_eq!(message.tool_calls()[0].arguments_value().unwrap(), json!({}));
}

#[test]
fn test_malformed_tool_arguments() {
    let call = ToolCall::new("call_1", "update_records", "{\"ids\": [");
    assert!(call.arguments_value().is_err());
}

#[test]
fn test_tool_definition_shape() {
    let tool = Tool::new(
        "get_data",
        "Run a SOQL query",
        json!({"type": "object", "properties": {"query": {"type": "string"}}}),
    );

    let value = serde_json::to_value(&tool).unwrap();
    assert_eq!(value["type"], "function");
    assert_eq!(value["function"]["name"], "get_data");
    assert_eq!(tool.name(), "get_data");
}

#[test]
fn test_tool_choice_serialization() {
    assert_eq!(serde_json::to_value(ToolChoice::auto()).unwrap(), json!("auto"));
    assert_eq!(
        serde_json::to_value(ToolChoice::force("web_search")).unwrap(),
        json!({"type": "function", "function": {"name": "web_search"}})
    );
}

#[test]
fn test_content_from_str() {
    let content: Content = "hello".into();
    assert_eq!(content.as_text(), "hello");
    assert!(!content.is_empty());
}
