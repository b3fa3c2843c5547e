//! Action-space description appended to GUI agent instructions.

use crate::action_parser::GrammarMode;
use crate::engine::ActionSyntax;

const ACTION_SPACE: &str = "\
## Action Space
click(start_box='(x1,y1)')
left_double(start_box='(x1,y1)')
right_single(start_box='(x1,y1)')
drag(start_box='(x1,y1)', end_box='(x2,y2)')
hotkey(key='ctrl c')
type(content='xxx') # Use escape characters \\', \\\" and \\n in content. End with \\n to submit.
scroll(start_box='(x1,y1)', direction='down or up or right or left')
wait() # Sleep for 5s and take a screenshot to check for changes.
finished(content='xxx') # Submit the task with a final report.";

const BC_FORMAT: &str = "\
## Output Format
```
Thought: ...
Action: ...
```";

const O1_FORMAT: &str = "\
## Output Format
```
<Thought>...</Thought>
Action_Summary: ...
Action: ...
</Output>
```";

const MARKER_FORMAT: &str = "\
## Output Format
Reason about the screen first, then write exactly one line starting with
`Action:` followed by a single call from the action space.";

const NOTES: &str = "\
## Note
- Coordinates are relative to the screenshot, scaled to the model's coordinate grid.
- Separate multiple actions with a blank line.
- Call finished() once the task is complete.";

/// Describe the output format and the callable actions for a GUI model.
pub fn action_space_prompt(syntax: ActionSyntax, mode: GrammarMode) -> String {
    let format = match (syntax, mode) {
        (ActionSyntax::Marker, _) => MARKER_FORMAT,
        (ActionSyntax::Grammar, GrammarMode::Bc) => BC_FORMAT,
        (ActionSyntax::Grammar, GrammarMode::O1) => O1_FORMAT,
    };
    format!(
        "You are a GUI agent. You are given a task and screenshots of the screen. \
         Perform the next action to complete the task.\n\n{format}\n\n{ACTION_SPACE}\n\n{NOTES}"
    )
}
