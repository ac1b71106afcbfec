use anyhow::anyhow;
use tracing::{
  instrument,
  warn
};

use crate::task::{
  Priority,
  Status,
  Task
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mod {
  Title(String),
  Description(String),
  Priority(Priority),
  Status(Status)
}

/// Splits `add` arguments into the
/// title words and `key:value`
/// modifiers. Everything after `--`
/// is title text.
#[instrument(skip(args))]
pub(crate) fn parse_title_and_mods(
  args: &[String]
) -> anyhow::Result<(String, Vec<Mod>)>
{
  let (head, tail) = match args
    .iter()
    .position(|a| a == "--")
  {
    | Some(idx) => {
      (&args[..idx], &args[idx + 1..])
    }
    | None => (args, &args[..0])
  };

  let mut words: Vec<&str> = Vec::new();
  let mut mods = Vec::new();
  for arg in head {
    match parse_one_mod(arg)? {
      | Some(one_mod) => mods.push(one_mod),
      | None => words.push(arg)
    }
  }
  words.extend(
    tail.iter().map(String::as_str)
  );

  let named = mods
    .iter()
    .any(|m| matches!(m, Mod::Title(_)));
  if words.is_empty() && !named {
    return Err(anyhow!(
      "add: a title is required"
    ));
  }

  Ok((words.join(" "), mods))
}

/// Modifiers for `edit`. Tokens that
/// are not `key:value` are ignored.
#[instrument(skip(args))]
pub(crate) fn parse_mods(
  args: &[String]
) -> anyhow::Result<Vec<Mod>> {
  args
    .iter()
    .filter_map(|arg| {
      parse_one_mod(arg).transpose().or_else(|| {
        warn!(arg = %arg, "not a modifier; ignored");
        None
      })
    })
    .collect()
}

fn parse_one_mod(
  tok: &str
) -> anyhow::Result<Option<Mod>> {
  let Some((key, value)) =
    tok.split_once(':')
  else {
    return Ok(None);
  };

  let key = key.to_ascii_lowercase();

  match key.as_str() {
    | "title" => {
      Ok(Some(Mod::Title(
        value.to_string()
      )))
    }
    | "desc" | "description" => {
      Ok(Some(Mod::Description(
        value.to_string()
      )))
    }
    | "pri" | "priority" => {
      Ok(Some(Mod::Priority(
        value.parse()?
      )))
    }
    | "status" => {
      Ok(Some(Mod::Status(
        value.parse()?
      )))
    }
    | _ => Ok(None)
  }
}

pub(crate) fn apply_mods(
  task: &mut Task,
  mods: &[Mod]
) {
  for one_mod in mods {
    match one_mod {
      | Mod::Title(title) => {
        task.title = title.clone();
      }
      | Mod::Description(desc) => {
        task.description = desc.clone();
      }
      | Mod::Priority(priority) => {
        task.priority = *priority;
      }
      | Mod::Status(status) => {
        task.status = *status;
      }
    }
  }
}
