use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum Command {
  /// Open the main menu
  Start,
  /// Show the help text
  Help,
  /// Open the admin panel
  Admin,
  /// Abort the current multi-step action
  Cancel,
  /// Grant admin rights (groups, admins only)
  AddAdmin,
  /// Revoke admin rights (groups, admins only)
  RemoveAdmin,
}
