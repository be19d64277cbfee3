use serde::Serialize;

use crate::cmd::{SwipeArgs, TapArgs, Target};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_result, Field, OutputFormat};

#[derive(Serialize)]
struct InputOutput {
    action: &'static str,
    points: Vec<[i32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u32>,
}

pub fn tap(args: TapArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let connection = target.connect()?;
    let result = connection.tap(args.x, args.y);
    connection.close();
    result.map_err(|err| session_error("tap failed", err))?;

    report(
        InputOutput {
            action: "tap",
            points: vec![[args.x, args.y]],
            duration_ms: None,
        },
        format,
    );
    Ok(SUCCESS)
}

pub fn swipe(args: SwipeArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let connection = target.connect()?;
    let result = connection.swipe(args.x1, args.y1, args.x2, args.y2, args.duration);
    connection.close();
    result.map_err(|err| session_error("swipe failed", err))?;

    report(
        InputOutput {
            action: "swipe",
            points: vec![[args.x1, args.y1], [args.x2, args.y2]],
            duration_ms: Some(args.duration),
        },
        format,
    );
    Ok(SUCCESS)
}

fn report(out: InputOutput, format: OutputFormat) {
    let points = out
        .points
        .iter()
        .map(|[x, y]| format!("({x}, {y})"))
        .collect::<Vec<_>>()
        .join(" -> ");
    let mut fields = vec![Field::new("Action", out.action), Field::new("Points", &points)];
    if let Some(ms) = out.duration_ms {
        fields.push(Field::new("Duration", format!("{ms}ms")));
    }
    print_result(&out, &fields, out.action, format);
}
