fn main() -> anyhow::Result<()> {
    sql_agent_lib::run()
}
