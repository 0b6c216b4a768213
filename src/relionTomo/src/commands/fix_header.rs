
use gumdrop::Options;

use crate::mrc::fix_volume_header;


#[derive(Options)]
pub struct Args {

	/// MRC files holding single volumes
	#[options(free, required)]
	paths: Vec<String>
}


pub fn run(args: Args) -> Result<(),anyhow::Error> {
	for path in &args.paths {
		if fix_volume_header(path)? {
			println!("fixed: {}", path);
		} else {
			println!("ok: {}", path);
		}
	}
	Ok(())
}
