use crmpilot_llm::{ChatOptions, ChatRequest, Message, Tool, ToolChoice};
use serde_json::json;

#[test]
fn test_chat_request_creation() {
    let request = ChatRequest::new("gpt-4o", vec![Message::human("Hello")]);

    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.messages.len(), 1);
    assert!(request.options.tools.is_none());
}

#[test]
fn test_chat_options_builder() {
    let tools = vec![Tool::new("test", "Test tool", json!({"type": "object"}))];

    let options = ChatOptions::new()
        .temperature(0.5)
        .max_tokens(200)
        .tools(tools)
        .tool_choice(ToolChoice::auto());

    let request = ChatRequest::new("gpt-4o", vec![]).with_options(options);

    assert_eq!(request.options.temperature, Some(0.5));
    assert_eq!(request.options.max_tokens, Some(200));
    assert_eq!(request.options.tools.as_ref().map(Vec::len), Some(1));
    assert!(request.options.tool_choice.is_some());
}

#[test]
fn test_empty_tool_list_is_dropped() {
    let options = ChatOptions::new().tools(Vec::new());
    assert!(options.tools.is_none());
}
