use pdfraster::arena::ByteArena;
use pdfraster::pdf::object::ObjectArena;
use pdfraster::pdf::resolver::{RecordArenas, Resolver};
use pdfraster::pdf::xref::XrefTable;
use pdfraster::pdf::render_page;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args_os();
    let mut next = || args.next().ok_or("usage: pdfraster input.pdf output.bmp [page]");
    let _self = next()?;
    let input = next()?;
    let output = next()?;
    let page_number: usize = match args.next() {
        Some(n) => n.to_string_lossy().parse()?,
        None => 0,
    };

    let buffer = std::fs::read(&input)?;
    let xref = XrefTable::load(&buffer)?;
    let byte_arena = ByteArena::new();
    let object_arena = ObjectArena::new();
    let records = RecordArenas::default();
    let resolver = Resolver::new(&buffer, xref, &byte_arena, &object_arena, &records);

    let canvas = render_page(&resolver, page_number)?;
    let mut file = std::fs::File::create(&output)?;
    canvas.write_bmp(&mut file)?;
    Ok(())
}
