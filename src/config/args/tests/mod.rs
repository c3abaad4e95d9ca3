mod subcommands;
