use courier::solver::dispatch;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dispatch::run()
}
