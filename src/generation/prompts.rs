//! System and user prompts sent to the model.

use super::request::{GenerateRequest, Mode, sanitize_prompt};
use crate::providers::{Message, Role};

const BASE_PROMPT: &str = "You are an expert Roblox Studio AI assistant that can directly manipulate game instances and scripts. You understand the full Roblox API and can perform precise operations.

CRITICAL: You must respond with valid JSON only. No additional text or explanations outside the JSON structure.";

const DIRECT_EDIT_PROMPT: &str = r#"Your job is to perform DIRECT EDITS to existing instances and scripts without creating new scripts unless absolutely necessary. You can:
1. Modify properties of existing instances (Vector3, UDim2, Color3, CFrame, numbers, booleans, strings)
2. Edit specific lines of existing scripts (replace, insert, delete, append)
3. Delete instances when requested
4. Create new instances only if specifically requested

Response format:
{
    "operations": [
        {
            "type": "modify_instance",
            "path": ["Workspace", "Part1"],
            "properties": {
                "Size": {"type": "Vector3", "value": "10,1,10"},
                "Color": {"type": "Color3", "value": "1,0,0"},
                "Material": "Neon",
                "Anchored": true
            }
        },
        {
            "type": "edit_script",
            "path": ["ServerScriptService", "MyScript"],
            "edits": [
                {"action": "replace", "lineNumber": 5, "content": "    print('Modified line')"},
                {"action": "insert", "lineNumber": 10, "content": "    -- New functionality added"},
                {"action": "delete", "lineNumber": 15},
                {"action": "append", "content": "-- End of script"}
            ]
        },
        {
            "type": "delete_instance",
            "path": ["Workspace", "ObsoleteModel"]
        },
        {
            "type": "create_instance",
            "className": "Part",
            "name": "NewPart",
            "path": ["Workspace"],
            "properties": {"Anchored": true}
        }
    ],
    "summary": "Brief description of changes made"
}

Line numbers start at 1. Be extremely precise with paths and property types. Use minimal operations to achieve the goal."#;

const GENERATE_PROMPT: &str = r#"Your job is to generate new scripts and instances when direct editing isn't suitable.

Response format:
{
    "scripts": [
        {
            "type": "Script|LocalScript|ModuleScript",
            "name": "ScriptName",
            "path": ["Service", "Folder"],
            "source": "-- Complete Lua code here"
        }
    ],
    "instances": [
        {
            "className": "Part|Model|etc",
            "name": "InstanceName",
            "path": ["Parent1", "Parent2"],
            "properties": {
                "Size": {"type": "Vector3", "value": "1,2,3"},
                "Position": {"type": "Vector3", "value": "0,5,0"}
            }
        }
    ],
    "summary": "Brief description of what was generated"
}"#;

const DIRECT_EDIT_GUIDANCE: &str = "
IMPORTANT: Perform direct modifications to existing instances. Do not create scripts unless absolutely necessary.

Examples of what you should do:
- \"make all parts red\" -> modify Color property of existing parts
- \"delete spawn locations\" -> delete SpawnLocation instances
- \"resize selected part\" -> modify Size property of selected instance
- \"anchor all parts\" -> modify Anchored property of parts
- \"fix script error on line 25\" -> edit specific line in script

Focus on minimal, precise changes that directly address the request.";

pub fn system_prompt(mode: Mode) -> String {
    let body = match mode {
        Mode::DirectEdit => DIRECT_EDIT_PROMPT,
        Mode::Generate => GENERATE_PROMPT,
    };
    format!("{BASE_PROMPT}\n\n{body}")
}

pub fn user_prompt(request: &GenerateRequest, summary: &str, mode: Mode) -> String {
    let mut out = format!(
        "User Request: {}\n\nMode: {}\n",
        sanitize_prompt(&request.prompt),
        mode
    );

    if !request.selected_instances.is_empty() {
        out.push_str("\nCurrently Selected Instances:\n");
        for instance in &request.selected_instances {
            out.push_str(&format!(
                "- {} \"{}\" at {}\n",
                instance.class_name,
                instance.name,
                instance.path.join("/")
            ));
        }
    }

    out.push_str("\nGame Structure Context:\n");
    out.push_str(summary);

    if mode == Mode::DirectEdit {
        out.push('\n');
        out.push_str(DIRECT_EDIT_GUIDANCE);
    }
    out
}

/// The system + user message pair for one generation.
pub fn build_messages(request: &GenerateRequest, summary: &str, mode: Mode) -> Vec<Message> {
    vec![
        Message::new(Role::System, system_prompt(mode)),
        Message::new(Role::User, user_prompt(request, summary, mode)),
    ]
}
